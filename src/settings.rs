//! Engine Settings
//!
//! The whole configuration surface is one statically typed tree with
//! enumerated option groups. Hosts configure the engine by handing a partial
//! JSON document to [`Settings::from_patch`]; the patch is deep-merged over
//! the defaults and deserialized back into the typed tree, so unknown keys
//! fail loudly and every field has exactly one authoritative default.
//!
//! The merge is idempotent: `merge(defaults, merge(defaults, x))` equals
//! `merge(defaults, x)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// Root of the configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub engine: EngineSettings,
    pub camera: CameraSettings,
    pub rendering: RenderingSettings,
    pub noise: NoiseSettings,
    pub dithering: DitherSettings,
    pub bloom: BloomSettings,
    pub environment: EnvironmentSettings,
    pub main_light: MainLightSettings,
    pub shadow: ShadowSettings,
    pub ao: AoSettings,
    pub lighting: LightingSettings,
    pub culling: CullingSettings,
    pub occlusion_culling: OcclusionCullingSettings,
    pub skinning: SkinningSettings,
    pub ssgi: SsgiSettings,
    pub volumetric_fog: VolumetricFogSettings,
    pub planar_reflection: PlanarReflectionSettings,
    pub ambient_capture: AmbientCaptureSettings,
    pub temporal: TemporalSettings,
    pub performance: PerformanceSettings,
    pub crt: CrtSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            camera: CameraSettings::default(),
            rendering: RenderingSettings::default(),
            noise: NoiseSettings::default(),
            dithering: DitherSettings::default(),
            bloom: BloomSettings::default(),
            environment: EnvironmentSettings::default(),
            main_light: MainLightSettings::default(),
            shadow: ShadowSettings::default(),
            ao: AoSettings::default(),
            lighting: LightingSettings::default(),
            culling: CullingSettings::default(),
            occlusion_culling: OcclusionCullingSettings::default(),
            skinning: SkinningSettings::default(),
            ssgi: SsgiSettings::default(),
            volumetric_fog: VolumetricFogSettings::default(),
            planar_reflection: PlanarReflectionSettings::default(),
            ambient_capture: AmbientCaptureSettings::default(),
            temporal: TemporalSettings::default(),
            performance: PerformanceSettings::default(),
            crt: CrtSettings::default(),
        }
    }
}

impl Settings {
    /// Builds a settings tree by deep-merging `patch` over the defaults.
    pub fn from_patch(patch: &Value) -> Result<Self> {
        let mut base = serde_json::to_value(Settings::default())?;
        deep_merge(&mut base, patch);
        Ok(serde_json::from_value(base)?)
    }
}

/// Recursively merges `patch` into `base`.
///
/// Objects merge key by key; any other value (including arrays) replaces the
/// base value wholesale.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => *base_slot = patch_value.clone(),
    }
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Cap the framerate to the display refresh rate.
    pub vsync: bool,
    /// Prefer the discrete GPU when more than one adapter is present.
    pub high_performance_adapter: bool,
    /// Resolution scale applied to every screen-sized target.
    pub render_scale: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            high_performance_adapter: true,
            render_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 70.0,
            near: 0.05,
            far: 5000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderingSettings {
    /// Multiplier applied to the emission G-buffer target.
    pub emission_factor: f32,
    /// Snap view-space positions to this grid (0 disables).
    pub position_rounding: f32,
    /// Round vertices to output pixels, with sub-pixel outward expansion.
    pub pixel_rounding: bool,
    /// Edge anti-aliasing in the post pass.
    pub fxaa: bool,
}

impl Default for RenderingSettings {
    fn default() -> Self {
        Self {
            emission_factor: 1.0,
            position_rounding: 0.0,
            pixel_rounding: false,
            fxaa: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseSettings {
    /// Side length of the generated blue-noise substitute texture.
    pub size: u32,
    /// Re-randomize the noise lookup offset each frame.
    pub animated: bool,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            size: 128,
            animated: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DitherSettings {
    pub enabled: bool,
    /// Color levels per channel for ordered dithering.
    pub levels: u32,
}

impl Default for DitherSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            levels: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Soft-threshold knee start in scene luminance.
    pub threshold: f32,
    pub knee: f32,
    /// Per-channel clamp applied before the mip chain.
    pub max_brightness: f32,
    pub mip_levels: u32,
    pub strength: f32,
    /// Extra weight for emissive pixels brighter than 1.
    pub emissive_boost: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            knee: 0.5,
            max_brightness: 12.0,
            mip_levels: 5,
            strength: 0.35,
            emissive_boost: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentSettings {
    /// Path of the environment texture, or `None` for the built-in gradient.
    pub texture: Option<String>,
    /// Diffuse IBL intensity.
    pub diffuse: f32,
    /// Specular IBL intensity.
    pub specular: f32,
    pub exposure: f32,
    pub fog: EnvironmentFogSettings,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            texture: None,
            diffuse: 1.0,
            specular: 1.0,
            exposure: 1.0,
            fog: EnvironmentFogSettings::default(),
        }
    }
}

/// Simple distance fog blended toward the environment color.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentFogSettings {
    pub enabled: bool,
    pub color: [f32; 3],
    pub start: f32,
    pub end: f32,
}

impl Default for EnvironmentFogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [0.5, 0.6, 0.7],
            start: 100.0,
            end: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MainLightSettings {
    /// World-space direction the light travels (toward the scene).
    pub direction: [f32; 3],
    /// RGB color; alpha carries intensity.
    pub color: [f32; 4],
}

impl Default for MainLightSettings {
    fn default() -> Self {
        Self {
            direction: [-0.35, -0.8, -0.45],
            color: [1.0, 0.96, 0.9, 3.0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadowSettings {
    /// Square side of every cascade layer.
    pub map_size: u32,
    pub cascade_count: u32,
    /// World-space half-widths of the cascade squares, innermost first.
    pub cascade_sizes: Vec<f32>,
    pub max_spot_shadows: u32,
    pub spot_tile_size: u32,
    pub spot_atlas_size: u32,
    /// Spot lights farther than this get no atlas slot.
    pub spot_max_distance: f32,
    /// Fraction of `spot_max_distance` where the shadow fade begins.
    pub spot_fade_start: f32,
    pub bias: f32,
    pub normal_bias: f32,
    /// Percentage clip-space silhouette expansion applied in the depth pass.
    pub surface_bias: f32,
    pub strength: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 2048,
            cascade_count: 3,
            cascade_sizes: vec![12.0, 48.0, 192.0],
            max_spot_shadows: 16,
            spot_tile_size: 512,
            spot_atlas_size: 2048,
            spot_max_distance: 60.0,
            spot_fade_start: 0.75,
            bias: 0.0008,
            normal_bias: 0.02,
            surface_bias: 0.004,
            strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AoSettings {
    pub enabled: bool,
    pub radius: f32,
    pub strength: f32,
    pub samples: u32,
}

impl Default for AoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.6,
            strength: 1.0,
            samples: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightingSettings {
    pub max_lights: u32,
    /// Side length in pixels of a light-culling tile.
    pub tile_size: u32,
    pub max_lights_per_tile: u32,
    pub direct_specular_multiplier: f32,
    /// Intensity of the synthetic three-point specular boost.
    pub specular_boost: f32,
    /// Roughness above which the boost fades out entirely.
    pub specular_boost_roughness_cutoff: f32,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            max_lights: 256,
            tile_size: 16,
            max_lights_per_tile: 256,
            direct_specular_multiplier: 1.0,
            specular_boost: 0.0,
            specular_boost_roughness_cutoff: 0.5,
        }
    }
}

/// Per-view culling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CullingPassSettings {
    pub frustum: bool,
    pub hi_z: bool,
    /// Intersect instances with each cascade's coverage sphere.
    pub cascade_filter: bool,
    pub max_distance: f32,
    /// Individual-animation budget for skinned meshes; 0 means unlimited.
    pub max_skinned: u32,
    /// Reject instances whose projected radius falls below this (pixels).
    pub min_pixel_size: f32,
    /// Fraction of `max_distance` where the dither fade begins.
    pub fade_start: f32,
}

impl Default for CullingPassSettings {
    fn default() -> Self {
        Self {
            frustum: true,
            hi_z: false,
            cascade_filter: false,
            max_distance: 1000.0,
            max_skinned: 0,
            min_pixel_size: 0.0,
            fade_start: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CullingSettings {
    pub frustum_enabled: bool,
    pub main: CullingPassSettings,
    pub shadow: CullingPassSettings,
    pub reflection: CullingPassSettings,
    pub planar_reflection: CullingPassSettings,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            frustum_enabled: true,
            main: CullingPassSettings {
                hi_z: true,
                max_skinned: 24,
                min_pixel_size: 1.5,
                ..CullingPassSettings::default()
            },
            shadow: CullingPassSettings {
                cascade_filter: true,
                max_distance: 400.0,
                min_pixel_size: 3.0,
                ..CullingPassSettings::default()
            },
            reflection: CullingPassSettings {
                max_distance: 300.0,
                min_pixel_size: 6.0,
                ..CullingPassSettings::default()
            },
            planar_reflection: CullingPassSettings {
                max_distance: 250.0,
                min_pixel_size: 4.0,
                ..CullingPassSettings::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcclusionCullingSettings {
    pub enabled: bool,
    /// A sphere is hidden when its nearest depth exceeds the covered tiles'
    /// min depth times this factor.
    pub threshold: f32,
    /// Spheres covering more tiles than this are accepted without testing.
    pub max_tile_span: u32,
    /// Camera translation (meters) that invalidates the depth history.
    pub position_threshold: f32,
    /// Camera rotation (radians) that invalidates the depth history.
    pub rotation_threshold: f32,
    /// Frames to skip occlusion testing after invalidation.
    pub warmup_frames: u32,
}

impl Default for OcclusionCullingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.02,
            max_tile_span: 24,
            position_threshold: 2.0,
            rotation_threshold: 0.35,
            warmup_frames: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkinningSettings {
    /// Phase buckets shared-animation skinned instances are grouped into.
    pub phase_buckets: u32,
}

impl Default for SkinningSettings {
    fn default() -> Self {
        Self { phase_buckets: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SsgiSettings {
    pub enabled: bool,
    /// Side length in pixels of an accumulation tile.
    pub tile_size: u32,
    pub intensity: f32,
    /// Per-channel clamp on accumulated tile brightness.
    pub max_brightness: f32,
    pub emissive_boost: f32,
    /// Propagation reach, in tiles, along each screen direction.
    pub half_screen_tiles: u32,
}

impl Default for SsgiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tile_size: 32,
            intensity: 0.7,
            max_brightness: 6.0,
            emissive_boost: 2.0,
            half_screen_tiles: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumetricFogSettings {
    pub enabled: bool,
    /// Screen resolution divisor for the ray-march target.
    pub resolution_divisor: u32,
    pub bottom_y: f32,
    pub top_y: f32,
    pub density: f32,
    pub max_samples: u32,
    pub noise_scale: f32,
    pub animated: bool,
    /// Fog visibility floor in bright regions.
    pub min_visibility: f32,
    /// Scene luminance where visibility attenuation begins.
    pub brightness_threshold: f32,
    /// Luminance treated as sky for attenuation purposes.
    pub sky_brightness: f32,
    pub blur_radius: f32,
    pub color: [f32; 3],
}

impl Default for VolumetricFogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution_divisor: 8,
            bottom_y: 0.0,
            top_y: 12.0,
            density: 0.04,
            max_samples: 48,
            noise_scale: 0.12,
            animated: true,
            min_visibility: 0.25,
            brightness_threshold: 1.2,
            sky_brightness: 4.0,
            blur_radius: 1.5,
            color: [0.8, 0.85, 0.9],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanarReflectionSettings {
    pub enabled: bool,
    /// World Y of the mirror plane.
    pub plane_y: f32,
    pub max_distance: f32,
    pub intensity: f32,
    /// Vertical fade distance above the plane.
    pub fade_height: f32,
}

impl Default for PlanarReflectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            plane_y: 0.0,
            max_distance: 250.0,
            intensity: 0.5,
            fade_height: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmbientCaptureSettings {
    pub enabled: bool,
    /// Frames between ambient probe refreshes.
    pub interval: u32,
}

impl Default for AmbientCaptureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemporalSettings {
    /// Sub-pixel projection jitter for temporal accumulation.
    pub jitter: bool,
    pub jitter_scale: f32,
    /// View distance where the jitter has fully faded out.
    pub jitter_fade_distance: f32,
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            jitter: true,
            jitter_scale: 1.0,
            jitter_fade_distance: 200.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceSettings {
    /// Request GPU timestamp queries (degrades to off when unsupported).
    pub timestamps: bool,
    /// Number of particles the simulation buffer holds.
    pub particle_capacity: u32,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            timestamps: false,
            particle_capacity: 16384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrtMaskKind {
    Aperture,
    Slot,
    Shadow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrtSettings {
    pub enabled: bool,
    pub curvature: f32,
    pub corner_radius: f32,
    pub scanline_strength: f32,
    /// Extra beam widening on bright scanlines.
    pub beam_widening: f32,
    /// RGB convergence offset in canvas pixels.
    pub convergence: f32,
    pub mask: CrtMaskKind,
    pub mask_strength: f32,
    pub vignette: f32,
    pub horizontal_blur: f32,
}

impl Default for CrtSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            curvature: 0.06,
            corner_radius: 0.02,
            scanline_strength: 0.35,
            beam_widening: 0.6,
            convergence: 0.4,
            mask: CrtMaskKind::Aperture,
            mask_strength: 0.25,
            vignette: 0.18,
            horizontal_blur: 0.5,
        }
    }
}
