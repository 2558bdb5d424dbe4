//! GPU-visible uniform and storage records.
//!
//! Every struct here is `#[repr(C)]` and mirrors a WGSL struct field for
//! field. Sizes are part of the cross-pass contract and are pinned by
//! `tests/layout_tests.rs`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

use crate::scene::RenderCamera;
use crate::settings::Settings;

/// Camera + frame globals, bound by the geometry, lighting and screen-space
/// passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inverse_view: Mat4,
    pub inverse_proj: Mat4,
    pub prev_view_proj: Mat4,
    /// xyz = world position.
    pub position: Vec4,
    pub forward: Vec4,
    /// Billboard basis.
    pub right: Vec4,
    pub up: Vec4,
    /// (w, h, 1/w, 1/h) at render scale.
    pub screen: Vec4,
    /// (near, far, emission factor, time seconds).
    pub near_far: Vec4,
    /// (jitter.x, jitter.y, jitter fade distance, jitter scale).
    pub jitter: Vec4,
    /// (plane Y, direction sign, enabled, unused). Used by the planar pass.
    pub clip_plane: Vec4,
    /// (view-space snap size, pixel rounding enabled, frame index, unused).
    pub rounding: Vec4,
    /// (fade start distance, fade end distance, unused, unused).
    pub fade: Vec4,
}

impl CameraUniform {
    #[must_use]
    pub fn build(
        camera: &RenderCamera,
        settings: &Settings,
        width: u32,
        height: u32,
        frame_index: u64,
        time: f32,
    ) -> Self {
        let fade_end = settings.culling.main.max_distance;
        let fade_start = fade_end * settings.culling.main.fade_start;
        Self {
            view: camera.view_matrix,
            proj: camera.projection_matrix,
            view_proj: camera.view_projection_matrix,
            inverse_view: camera.inverse_view,
            inverse_proj: camera.inverse_projection,
            prev_view_proj: camera.prev_view_projection,
            position: camera.position.extend(1.0),
            forward: camera.forward.extend(0.0),
            right: camera.right.extend(0.0),
            up: camera.up.extend(0.0),
            screen: Vec4::new(
                width as f32,
                height as f32,
                1.0 / width.max(1) as f32,
                1.0 / height.max(1) as f32,
            ),
            near_far: Vec4::new(
                camera.near,
                camera.far,
                settings.rendering.emission_factor,
                time,
            ),
            jitter: Vec4::new(
                camera.jitter.x,
                camera.jitter.y,
                settings.temporal.jitter_fade_distance,
                settings.temporal.jitter_scale,
            ),
            clip_plane: Vec4::ZERO,
            rounding: Vec4::new(
                settings.rendering.position_rounding,
                if settings.rendering.pixel_rounding { 1.0 } else { 0.0 },
                frame_index as f32,
                0.0,
            ),
            fade: Vec4::new(fade_start, fade_end, 0.0, 0.0),
        }
    }

    /// Variant for the mirrored planar render: clip plane on, no jitter.
    #[must_use]
    pub fn with_clip_plane(mut self, plane_y: f32, direction: f32) -> Self {
        self.clip_plane = Vec4::new(plane_y, direction, 1.0, 0.0);
        self.jitter.x = 0.0;
        self.jitter.y = 0.0;
        self
    }
}

/// Per-batch parameters, bound with a dynamic offset in the geometry and
/// shadow passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct BatchUniform {
    /// (billboard mode, skinned, alpha mode, luminance-to-alpha).
    pub flags: [u32; 4],
    /// (opacity, specular boost, alpha hash scale, double sided).
    pub surface: Vec4,
    /// rgb = emissive factor.
    pub emissive: Vec4,
    pub _pad: Vec4,
}

/// One analytic light, 96 bytes, matching the WGSL `Light` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct GpuLight {
    pub enabled: u32,
    pub _pad0: [u32; 3],
    pub position: [f32; 3],
    pub _pad1: f32,
    /// rgb color, alpha = intensity.
    pub color: [f32; 4],
    pub direction: [f32; 3],
    pub _pad2: f32,
    /// (radius, inner cone cos, outer cone cos, distance fade).
    pub geom: [f32; 4],
    /// Spot atlas slot 0..15, or -1 for no shadow.
    pub shadow_index: i32,
    pub _pad3: [u32; 3],
}

/// Uniform block of the tile light culling compute pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TileCullUniform {
    pub view: Mat4,
    pub proj: Mat4,
    /// (screen w, screen h, tile count x, tile count y).
    pub screen: Vec4,
    /// (light count, max lights per tile, tile size px, unused).
    pub counts: [u32; 4],
}

/// Uniform block shared by the lighting shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingUniform {
    /// (cascade count, tile count x, max lights per tile, tile size px).
    pub counts: [u32; 4],
    /// Cascade half-widths, up to four.
    pub cascade_sizes: Vec4,
    /// (shadow bias, normal bias, shadow strength, cascade map size).
    pub shadow_params: Vec4,
    /// (ibl diffuse, ibl specular, exposure, env encoding 0=equirect 1=octa).
    pub environment: Vec4,
    /// rgb = main light color, a = intensity.
    pub main_color: Vec4,
    /// xyz = main light direction.
    pub main_direction: Vec4,
    /// (ssgi intensity, ssgi enabled, ao strength, spot min shadow).
    pub gi_params: Vec4,
    /// (specular boost, boost roughness cutoff, direct specular multiplier,
    /// spot atlas tile count per row).
    pub specular: Vec4,
    /// (planar enabled, plane Y, planar intensity, planar fade height).
    pub planar: Vec4,
    /// (enabled, start, end, unused) for the simple distance fog.
    pub env_fog: Vec4,
    /// rgb = distance fog color.
    pub env_fog_color: Vec4,
}

/// Jitter helper: Halton (2,3) offset in NDC for the given frame, with the
/// sequence restarting every 8 frames.
#[must_use]
pub fn taa_jitter(frame_index: u64, width: u32, height: u32, scale: f32) -> Vec2 {
    let i = (frame_index % 8) as u32 + 1;
    let x = crate::utils::math::halton(i, 2) - 0.5;
    let y = crate::utils::math::halton(i, 3) - 0.5;
    Vec2::new(
        x * 2.0 * scale / width.max(1) as f32,
        y * 2.0 * scale / height.max(1) as f32,
    )
}
