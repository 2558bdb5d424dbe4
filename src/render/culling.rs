//! Visibility culling.
//!
//! One culling run per view (main camera, shadow, reflections), each with
//! its own [`CullingPassSettings`]. Tests run in cost order: distance,
//! projected size, frustum, then HiZ occlusion against the previous frame's
//! depth tiles. Survivors are grouped by model (and by shared-animation
//! bucket for skinned meshes) for the instance manager.
//!
//! Culling never fails: missing assets, pending loads and degenerate camera
//! matrices all produce an empty result and the frame completes.

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use rustc_hash::FxHashMap;

use crate::assets::AssetCache;
use crate::scene::{BillboardMode, Entity, EntityId, EntityStore, RenderCamera};
use crate::settings::{CullingPassSettings, OcclusionCullingSettings};

/// Pixel side of one HiZ tile (64 px reduction workgroup).
pub const HIZ_TILE_SIZE: u32 = 64;

/// Which joint texture an instance group binds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkinKey {
    /// Closest-N skinned entities animate individually.
    Individual(EntityId),
    /// Everything past the budget shares one phase-bucketed animator.
    Shared {
        model: String,
        clip: String,
        bucket: u32,
    },
}

/// Grouping key for batch building.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub model: String,
    pub skin: Option<SkinKey>,
}

/// One culling survivor.
#[derive(Debug, Clone)]
pub struct VisibleEntry {
    pub entity: EntityId,
    pub distance: f32,
    /// Dither-dissolve factor in `[0, 1]`, 1 fully visible.
    pub fade: f32,
    pub world: Mat4,
    /// World-space bounding sphere, `w` = radius.
    pub sphere: Vec4,
    pub uv_transform: Vec4,
    pub color: Vec4,
    pub is_static: bool,
    pub billboard: BillboardMode,
    pub skin_key: Option<SkinKey>,
}

/// Grouped culling output.
#[derive(Default)]
pub struct CullResults {
    pub groups: FxHashMap<BatchKey, Vec<VisibleEntry>>,
    pub tested: usize,
    pub visible: usize,
}

// ============================================================================
// HiZ snapshot
// ============================================================================

/// CPU copy of the previous frame's per-tile depth extremes.
#[derive(Debug, Clone, Default)]
pub struct HiZSnapshot {
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Interleaved (min, max) linear depth per tile, row-major.
    pub data: Vec<f32>,
}

impl HiZSnapshot {
    #[must_use]
    pub fn min_depth(&self, x: u32, y: u32) -> f32 {
        let idx = ((y * self.tiles_x + x) * 2) as usize;
        self.data.get(idx).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn max_depth(&self, x: u32, y: u32) -> f32 {
        let idx = ((y * self.tiles_x + x) * 2 + 1) as usize;
        self.data.get(idx).copied().unwrap_or(1.0)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tiles_x > 0 && self.tiles_y > 0 && self.data.len() >= (self.tiles_x * self.tiles_y * 2) as usize
    }
}

// ============================================================================
// Cull pass
// ============================================================================

/// Everything a single culling run reads.
pub struct CullInput<'a> {
    pub entities: &'a EntityStore,
    pub assets: &'a AssetCache,
    pub camera: &'a RenderCamera,
    pub config: &'a CullingPassSettings,
    pub occlusion: &'a OcclusionCullingSettings,
    pub frustum_enabled: bool,
    /// Previous-frame depth tiles; `None` skips the occlusion test.
    pub hi_z: Option<&'a HiZSnapshot>,
    pub screen_height: u32,
    pub phase_buckets: u32,
}

/// Runs the culling pipeline over every model-bearing entity.
#[must_use]
pub fn cull(input: &CullInput<'_>) -> CullResults {
    let mut results = CullResults::default();

    // A camera with non-finite matrices yields an empty visible set and the
    // frame still completes.
    if !input.camera.view_projection_matrix.is_finite() {
        return results;
    }

    let tan_half_fov = (input.camera.fov_y * 0.5).tan().max(1e-6);
    let fade_start = input.config.max_distance * input.config.fade_start.clamp(0.0, 1.0);

    // First pass: per-entity tests.
    let mut survivors: Vec<(EntityId, &Entity, String, f32, f32, Vec4, Mat4, bool)> = Vec::new();

    for (id, entity) in input.entities.iter() {
        let Some(model) = entity.model.clone() else {
            continue;
        };
        results.tested += 1;

        let world = entity.world_matrix();
        let sphere_ws = entity.bounding_sphere.transform(&world);
        let center = sphere_ws.center;
        let radius = sphere_ws.radius;

        // Distance test + fade factor.
        let distance = input.camera.position.distance(center);
        if distance - radius > input.config.max_distance {
            continue;
        }
        let fade = if distance <= fade_start {
            1.0
        } else {
            let span = (input.config.max_distance - fade_start).max(1e-6);
            (1.0 - (distance - fade_start) / span).clamp(0.0, 1.0)
        };

        // Minimum projected size in pixels.
        if input.config.min_pixel_size > 0.0 && distance > radius {
            let projected =
                radius * input.screen_height as f32 / (2.0 * distance * tan_half_fov);
            if projected < input.config.min_pixel_size {
                continue;
            }
        }

        // Frustum.
        if input.frustum_enabled
            && input.config.frustum
            && !input.camera.frustum.intersects_sphere(center, radius)
        {
            continue;
        }

        // HiZ occlusion against previous-frame depth tiles.
        if input.config.hi_z && input.occlusion.enabled {
            if let Some(hi_z) = input.hi_z {
                if hi_z.is_valid()
                    && occluded_by_hiz(input, hi_z, center, radius, distance, tan_half_fov)
                {
                    continue;
                }
            }
        }

        let has_skin = input
            .assets
            .get(&model)
            .is_some_and(|asset| asset.has_skin);
        survivors.push((
            id,
            entity,
            model,
            distance,
            fade,
            center.extend(radius),
            world,
            has_skin,
        ));
    }

    // Skinned budget: the closest `max_skinned` animate individually, the
    // rest share phase-bucketed animators.
    let max_skinned = input.config.max_skinned as usize;
    if max_skinned > 0 {
        let mut skinned_rank: Vec<(usize, f32)> = survivors
            .iter()
            .enumerate()
            .filter(|(_, s)| s.7)
            .map(|(i, s)| (i, s.3))
            .collect();
        skinned_rank.sort_unstable_by(|a, b| a.1.total_cmp(&b.1));
        let individual: rustc_hash::FxHashSet<usize> = skinned_rank
            .iter()
            .take(max_skinned)
            .map(|(i, _)| *i)
            .collect();

        for (index, (id, entity, model, distance, fade, sphere, world, has_skin)) in
            survivors.iter().enumerate()
        {
            let skin_key = if *has_skin {
                Some(skin_key_for(
                    *id,
                    entity,
                    model,
                    individual.contains(&index),
                    input.phase_buckets,
                ))
            } else {
                None
            };
            push_entry(
                &mut results, *id, entity, model, *distance, *fade, *sphere, *world, skin_key,
            );
        }
    } else {
        for (id, entity, model, distance, fade, sphere, world, has_skin) in &survivors {
            let skin_key = if *has_skin {
                Some(skin_key_for(*id, entity, model, true, input.phase_buckets))
            } else {
                None
            };
            push_entry(
                &mut results, *id, entity, model, *distance, *fade, *sphere, *world, skin_key,
            );
        }
    }

    for group in results.groups.values_mut() {
        group.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));
    }
    results.visible = results.groups.values().map(Vec::len).sum();
    results
}

fn skin_key_for(
    id: EntityId,
    entity: &Entity,
    model: &str,
    individual: bool,
    phase_buckets: u32,
) -> SkinKey {
    if individual {
        return SkinKey::Individual(id);
    }
    let clip = entity
        .animation
        .as_ref()
        .map(|a| a.clip.clone())
        .unwrap_or_default();
    // Stable per-entity phase assignment.
    let bucket = {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        id.hash(&mut hasher);
        (hasher.finish() % u64::from(phase_buckets.max(1))) as u32
    };
    SkinKey::Shared {
        model: model.to_string(),
        clip,
        bucket,
    }
}

fn push_entry(
    results: &mut CullResults,
    id: EntityId,
    entity: &Entity,
    model: &str,
    distance: f32,
    fade: f32,
    sphere: Vec4,
    world: Mat4,
    skin_key: Option<SkinKey>,
) {
    let key = BatchKey {
        model: model.to_string(),
        skin: skin_key.clone(),
    };
    // The fade factor rides in the instance color alpha; the geometry
    // shader dissolves against it.
    let mut color = entity.color;
    color.w *= fade;
    results.groups.entry(key).or_default().push(VisibleEntry {
        entity: id,
        distance,
        fade,
        world,
        sphere,
        uv_transform: entity.uv_transform,
        color,
        is_static: entity.is_static,
        billboard: entity.billboard,
        skin_key,
    });
}

/// Occlusion test against the previous frame's depth tiles.
///
/// Projects the sphere's screen rectangle into tile coordinates. Spans wider
/// than `max_tile_span` are accepted without testing; otherwise the sphere
/// is hidden when its nearest linear depth lies beyond the covered tiles'
/// min depth scaled by the threshold.
fn occluded_by_hiz(
    input: &CullInput<'_>,
    hi_z: &HiZSnapshot,
    center: Vec3,
    radius: f32,
    distance: f32,
    tan_half_fov: f32,
) -> bool {
    let clip = input.camera.view_projection_matrix * center.extend(1.0);
    if clip.w <= 0.0 {
        return false;
    }
    let ndc = clip.xyz() / clip.w;

    let screen_w = hi_z.tiles_x * HIZ_TILE_SIZE;
    let screen_h = hi_z.tiles_y * HIZ_TILE_SIZE;
    let pixel = Vec2::new(
        (ndc.x * 0.5 + 0.5) * screen_w as f32,
        (1.0 - (ndc.y * 0.5 + 0.5)) * screen_h as f32,
    );
    let pixel_radius = radius * input.screen_height as f32 / (2.0 * distance.max(1e-3) * tan_half_fov);

    let min_tile_x = (((pixel.x - pixel_radius) / HIZ_TILE_SIZE as f32).floor()).max(0.0) as u32;
    let max_tile_x = ((((pixel.x + pixel_radius) / HIZ_TILE_SIZE as f32).ceil()) as u32)
        .min(hi_z.tiles_x.saturating_sub(1));
    let min_tile_y = (((pixel.y - pixel_radius) / HIZ_TILE_SIZE as f32).floor()).max(0.0) as u32;
    let max_tile_y = ((((pixel.y + pixel_radius) / HIZ_TILE_SIZE as f32).ceil()) as u32)
        .min(hi_z.tiles_y.saturating_sub(1));
    if min_tile_x > max_tile_x || min_tile_y > max_tile_y {
        return false;
    }

    let span = (max_tile_x - min_tile_x + 1).max(max_tile_y - min_tile_y + 1);
    if span > input.occlusion.max_tile_span {
        return false;
    }

    let near = input.camera.near;
    let far = input.camera.far.max(near + 1e-3);
    let sphere_depth = ((distance - radius - near) / (far - near)).clamp(0.0, 1.0);

    let mut occluder_depth = 0.0f32;
    for ty in min_tile_y..=max_tile_y {
        for tx in min_tile_x..=max_tile_x {
            occluder_depth = occluder_depth.max(hi_z.min_depth(tx, ty));
        }
    }
    // A zero min depth is a tile that was never written (fresh history);
    // it cannot occlude.
    if occluder_depth <= 0.0 {
        return false;
    }

    sphere_depth > occluder_depth * input.occlusion.threshold
}

// ============================================================================
// Camera motion tracking (HiZ invalidation)
// ============================================================================

/// Invalidates the depth history when the camera jumps, with a short warmup
/// during which the occlusion test is skipped.
pub struct OcclusionWarmup {
    prev_position: Option<Vec3>,
    prev_forward: Option<Vec3>,
    remaining: u32,
}

impl OcclusionWarmup {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prev_position: None,
            prev_forward: None,
            remaining: 0,
        }
    }

    /// Forces a warmup, e.g. after a host-driven teleport.
    pub fn invalidate(&mut self, frames: u32) {
        self.remaining = self.remaining.max(frames.max(1));
    }

    /// Feeds this frame's camera pose; returns `true` while the occlusion
    /// test must be skipped.
    pub fn update(&mut self, camera: &RenderCamera, settings: &OcclusionCullingSettings) -> bool {
        if let (Some(prev_pos), Some(prev_fwd)) = (self.prev_position, self.prev_forward) {
            let moved = prev_pos.distance(camera.position) > settings.position_threshold;
            let angle = prev_fwd.dot(camera.forward).clamp(-1.0, 1.0).acos();
            if moved || angle > settings.rotation_threshold {
                self.remaining = self.remaining.max(settings.warmup_frames.max(1));
            }
        }
        self.prev_position = Some(camera.position);
        self.prev_forward = Some(camera.forward);

        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for OcclusionWarmup {
    fn default() -> Self {
        Self::new()
    }
}
