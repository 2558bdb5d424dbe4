//! Per-frame light collection.
//!
//! Walks the entity store and packs every enabled point and spot light into
//! the GPU light records consumed by tile culling and the deferred shader.
//! The cascade-shadowed directional light comes from the settings tree, not
//! from an entity. Spot shadow indices start at -1; the shadow pass assigns
//! atlas slots before the records are uploaded.

use glam::Vec3;
use slotmap::Key;

use crate::render::uniforms::GpuLight;
use crate::scene::{EntityStore, LightKind};
use crate::settings::Settings;

/// World-space data the spot shadow allocator needs per candidate.
#[derive(Debug, Clone)]
pub struct SpotCandidate {
    /// Index into [`FrameLights::records`].
    pub record: usize,
    /// Stable identity for the slot LRU (entity key bits).
    pub key: u64,
    pub position: Vec3,
    pub direction: Vec3,
    /// Cosine of the outer cone half-angle.
    pub outer_cone: f32,
    pub radius: f32,
    pub distance_to_camera: f32,
}

/// Collected lights for one frame.
#[derive(Default)]
pub struct FrameLights {
    pub records: Vec<GpuLight>,
    pub spots: Vec<SpotCandidate>,
}

impl FrameLights {
    /// Gathers lights from the scene, up to `lighting.max_lights` records.
    #[must_use]
    pub fn collect(entities: &EntityStore, settings: &Settings, camera_position: Vec3) -> Self {
        let max = settings.lighting.max_lights as usize;
        let mut lights = FrameLights::default();

        for (id, entity) in entities.iter() {
            if lights.records.len() >= max {
                log::debug!("Light budget of {max} reached, dropping remainder");
                break;
            }
            let Some(light) = &entity.light else {
                continue;
            };
            // The main directional light is configuration-driven; entity
            // lights feed the tiled loop, which is radius based.
            if light.kind == LightKind::Directional {
                continue;
            }

            let position = entity.position + light.offset;
            let distance = camera_position.distance(position);
            let spot_fade = spot_distance_fade(distance, settings);

            let record = GpuLight {
                enabled: u32::from(light.enabled),
                position: position.to_array(),
                color: light.color.to_array(),
                direction: light.direction.normalize_or(Vec3::NEG_Y).to_array(),
                geom: [
                    light.radius,
                    light.inner_cone,
                    light.outer_cone,
                    spot_fade,
                ],
                shadow_index: -1,
                ..GpuLight::default()
            };

            let index = lights.records.len();
            lights.records.push(record);

            if light.kind == LightKind::Spot && light.enabled {
                lights.spots.push(SpotCandidate {
                    record: index,
                    key: id.data().as_ffi(),
                    position,
                    direction: light.direction.normalize_or(Vec3::NEG_Y),
                    outer_cone: light.outer_cone,
                    radius: light.radius,
                    distance_to_camera: distance,
                });
            }
        }
        lights
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.records.len() as u32
    }
}

/// Shadow strength fade for spot lights: 1 below the fade start, linear to
/// 0 at the maximum shadow distance.
#[must_use]
pub fn spot_distance_fade(distance: f32, settings: &Settings) -> f32 {
    let max = settings.shadow.spot_max_distance.max(1e-3);
    let start = max * settings.shadow.spot_fade_start.clamp(0.0, 1.0);
    if distance <= start {
        1.0
    } else {
        (1.0 - (distance - start) / (max - start).max(1e-6)).clamp(0.0, 1.0)
    }
}
