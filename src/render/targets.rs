//! Shared render targets and cross-pass GPU buffers.
//!
//! The render graph owns every resource listed here and lends them to the
//! passes read-only. Passes never allocate screen-sized resources
//! themselves; `resize` recreates the screen-tracking subset wholesale and
//! is a no-op when dimensions have not changed.

use crate::gpu::{GpuBuffer, GpuTexture, HDR_FORMAT};
use crate::render::culling::HIZ_TILE_SIZE;
use crate::render::uniforms::GpuLight;
use crate::settings::Settings;

/// G-buffer color formats, fixed by the lighting contract.
pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const ARM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const EMISSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const VELOCITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;
pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Spot shadow atlas grid side (4×4 = 16 slots).
pub const SPOT_TILES_PER_ROW: u32 = 4;
/// Maximum spot shadow slots.
pub const MAX_SPOT_SHADOWS: u32 = SPOT_TILES_PER_ROW * SPOT_TILES_PER_ROW;
/// Upper bound on cascade count.
pub const MAX_CASCADES: u32 = 4;

/// The G-buffer attachment set.
pub struct GBuffer {
    pub albedo: GpuTexture,
    /// xyz = world normal, w = world Y (planar reflection fade).
    pub normal: GpuTexture,
    /// r = material AO, g = roughness, b = metallic, a = specular boost.
    pub arm: GpuTexture,
    pub emission: GpuTexture,
    /// Screen-pixel motion vectors.
    pub velocity: GpuTexture,
}

impl GBuffer {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self {
            albedo: GpuTexture::new_render_target(device, "GBuffer Albedo", width, height, ALBEDO_FORMAT),
            normal: GpuTexture::new_render_target(device, "GBuffer Normal", width, height, NORMAL_FORMAT),
            arm: GpuTexture::new_render_target(device, "GBuffer ARM", width, height, ARM_FORMAT),
            emission: GpuTexture::new_render_target(device, "GBuffer Emission", width, height, EMISSION_FORMAT),
            velocity: GpuTexture::new_render_target(device, "GBuffer Velocity", width, height, VELOCITY_FORMAT),
        }
    }

    fn destroy(&self) {
        self.albedo.destroy();
        self.normal.destroy();
        self.arm.destroy();
        self.emission.destroy();
        self.velocity.destroy();
    }
}

/// Everything that tracks the surface size, recreated together on resize.
pub struct ScreenTargets {
    /// Render-scale dimensions of the screen-sized targets.
    pub width: u32,
    pub height: u32,
    /// Surface dimensions before the render scale.
    pub surface_width: u32,
    pub surface_height: u32,

    pub gbuffer: GBuffer,
    depth: [GpuTexture; 2],
    hdr: [GpuTexture; 2],
    /// Which depth texture is written this frame; flips once per frame.
    depth_index: usize,
    /// Which HDR texture is the current scene color; flips at frame start
    /// and after every full-buffer composite (fog, bloom).
    scene_index: usize,

    /// LDR output of the post pass, input of the CRT pass.
    pub ldr: GpuTexture,

    pub tile_light_buffer: GpuBuffer,
    pub tile_count_x: u32,
    pub tile_count_y: u32,

    pub hiz_buffer: GpuBuffer,
    pub hiz_tiles_x: u32,
    pub hiz_tiles_y: u32,

    pub ssao: GpuTexture,
    pub ssgi_accum: GpuBuffer,
    pub ssgi_propagate: GpuBuffer,
    pub ssgi_resolve: GpuTexture,
    pub ssgi_tiles_x: u32,
    pub ssgi_tiles_y: u32,
    pub planar_color: GpuTexture,
    pub planar_depth: GpuTexture,
    pub fog_color: GpuTexture,
    pub fog_blur: GpuTexture,
    /// Half-resolution bloom pyramid.
    pub bloom: GpuTexture,
    pub bloom_mip_count: u32,
}

impl ScreenTargets {
    fn new(device: &wgpu::Device, surface_width: u32, surface_height: u32, settings: &Settings) -> Self {
        let scale = settings.engine.render_scale.clamp(0.25, 2.0);
        let width = ((surface_width as f32 * scale) as u32).max(16);
        let height = ((surface_height as f32 * scale) as u32).max(16);

        let tile = settings.lighting.tile_size.max(8);
        let tile_count_x = width.div_ceil(tile);
        let tile_count_y = height.div_ceil(tile);
        let hiz_tiles_x = width.div_ceil(HIZ_TILE_SIZE);
        let hiz_tiles_y = height.div_ceil(HIZ_TILE_SIZE);
        let ssgi_tile = settings.ssgi.tile_size.max(8);
        let ssgi_tiles_x = width.div_ceil(ssgi_tile);
        let ssgi_tiles_y = height.div_ceil(ssgi_tile);
        let fog_div = settings.volumetric_fog.resolution_divisor.max(2);
        let half_w = (width / 2).max(8);
        let half_h = (height / 2).max(8);
        let max_mips = 32 - half_w.max(half_h).leading_zeros();
        let bloom_mip_count = settings.bloom.mip_levels.clamp(1, max_mips.max(1));

        Self {
            width,
            height,
            surface_width,
            surface_height,
            gbuffer: GBuffer::new(device, width, height),
            depth: [
                GpuTexture::new_depth(device, "Scene Depth 0", width, height, 1),
                GpuTexture::new_depth(device, "Scene Depth 1", width, height, 1),
            ],
            hdr: [
                GpuTexture::new_render_target(device, "HDR Color 0", width, height, HDR_FORMAT),
                GpuTexture::new_render_target(device, "HDR Color 1", width, height, HDR_FORMAT),
            ],
            depth_index: 0,
            scene_index: 0,
            ldr: GpuTexture::new_render_target(
                device,
                "LDR Color",
                width,
                height,
                wgpu::TextureFormat::Rgba8Unorm,
            ),
            tile_light_buffer: GpuBuffer::new_storage(
                device,
                "Tile Light List",
                u64::from(tile_count_x * tile_count_y)
                    * u64::from(1 + settings.lighting.max_lights_per_tile)
                    * 4,
            ),
            tile_count_x,
            tile_count_y,
            hiz_buffer: GpuBuffer::new_storage(
                device,
                "HiZ Tiles",
                u64::from(hiz_tiles_x * hiz_tiles_y) * 8,
            ),
            hiz_tiles_x,
            hiz_tiles_y,
            ssao: GpuTexture::new_render_target(device, "SSAO", half_w, half_h, SSAO_FORMAT),
            ssgi_accum: GpuBuffer::new_storage(
                device,
                "SSGI Tile Accum",
                u64::from(ssgi_tiles_x * ssgi_tiles_y) * 16,
            ),
            ssgi_propagate: GpuBuffer::new_storage(
                device,
                "SSGI Tile Propagate",
                u64::from(ssgi_tiles_x * ssgi_tiles_y) * 4 * 16,
            ),
            ssgi_resolve: GpuTexture::new_render_target(device, "SSGI Resolve", half_w, half_h, HDR_FORMAT),
            ssgi_tiles_x,
            ssgi_tiles_y,
            planar_color: GpuTexture::new_render_target(device, "Planar Reflection", half_w, half_h, HDR_FORMAT),
            planar_depth: GpuTexture::new_depth(device, "Planar Depth", half_w, half_h, 1),
            fog_color: GpuTexture::new_render_target(
                device,
                "Volumetric Fog",
                (width / fog_div).max(8),
                (height / fog_div).max(8),
                HDR_FORMAT,
            ),
            fog_blur: GpuTexture::new_render_target(
                device,
                "Volumetric Fog Blur",
                (width / fog_div).max(8),
                (height / fog_div).max(8),
                HDR_FORMAT,
            ),
            bloom: GpuTexture::new_mipped_target(
                device,
                "Bloom Pyramid",
                half_w,
                half_h,
                bloom_mip_count,
                HDR_FORMAT,
            ),
            bloom_mip_count,
        }
    }

    fn destroy(&self) {
        self.gbuffer.destroy();
        for t in &self.depth {
            t.destroy();
        }
        for t in &self.hdr {
            t.destroy();
        }
        self.ldr.destroy();
        self.tile_light_buffer.destroy();
        self.hiz_buffer.destroy();
        self.ssao.destroy();
        self.ssgi_accum.destroy();
        self.ssgi_propagate.destroy();
        self.ssgi_resolve.destroy();
        self.planar_color.destroy();
        self.planar_depth.destroy();
        self.fog_color.destroy();
        self.fog_blur.destroy();
        self.bloom.destroy();
    }
}

/// Every resource shared between passes.
pub struct SharedTargets {
    pub screen: ScreenTargets,

    // --- Shadow (independent of surface size) ---
    pub cascade_map: GpuTexture,
    pub spot_atlas: GpuTexture,
    /// `cascade_count` view-projection matrices.
    pub cascade_matrices: GpuBuffer,
    /// 16 spot view-projection matrices.
    pub spot_matrices: GpuBuffer,

    // --- Lights ---
    pub light_buffer: GpuBuffer,
}

impl SharedTargets {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        surface_width: u32,
        surface_height: u32,
        settings: &Settings,
    ) -> Self {
        let cascade_count = settings.shadow.cascade_count.clamp(1, MAX_CASCADES);
        // The lighting shader always binds the cascade map as a depth
        // array, including the single-cascade configuration.
        let mut cascade_map = GpuTexture::new_depth(
            device,
            "Cascade Shadow Map",
            settings.shadow.map_size,
            settings.shadow.map_size,
            cascade_count,
        );
        cascade_map.view = cascade_map.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        Self {
            screen: ScreenTargets::new(device, surface_width, surface_height, settings),
            cascade_map,
            spot_atlas: GpuTexture::new_depth(
                device,
                "Spot Shadow Atlas",
                settings.shadow.spot_atlas_size,
                settings.shadow.spot_atlas_size,
                1,
            ),
            cascade_matrices: GpuBuffer::new_storage(device, "Cascade Matrices", u64::from(MAX_CASCADES) * 64),
            spot_matrices: GpuBuffer::new_storage(device, "Spot Matrices", u64::from(MAX_SPOT_SHADOWS) * 64),
            light_buffer: GpuBuffer::new_storage(
                device,
                "Light Buffer",
                u64::from(settings.lighting.max_lights.max(1)) * std::mem::size_of::<GpuLight>() as u64,
            ),
        }
    }

    /// Current-frame depth attachment.
    #[must_use]
    pub fn depth(&self) -> &GpuTexture {
        &self.screen.depth[self.screen.depth_index]
    }

    /// Previous-frame depth, the HiZ reducer input.
    #[must_use]
    pub fn prev_depth(&self) -> &GpuTexture {
        &self.screen.depth[1 - self.screen.depth_index]
    }

    /// Current scene color write target.
    #[must_use]
    pub fn hdr(&self) -> &GpuTexture {
        &self.screen.hdr[self.screen.scene_index]
    }

    /// The other HDR buffer: the previous frame's final color early in the
    /// frame (SSGI input), or a composite's scratch output later.
    #[must_use]
    pub fn prev_hdr(&self) -> &GpuTexture {
        &self.screen.hdr[1 - self.screen.scene_index]
    }

    /// Starts a frame: swaps the depth history and moves the scene color
    /// write target off last frame's final image.
    pub fn begin_frame(&mut self) {
        self.screen.depth_index = 1 - self.screen.depth_index;
        self.screen.scene_index = 1 - self.screen.scene_index;
    }

    /// Makes a composite's output buffer the current scene color. Called by
    /// the graph after the fog and bloom prepare steps.
    pub fn flip_scene_color(&mut self) {
        self.screen.scene_index = 1 - self.screen.scene_index;
    }

    /// Recreates every screen-sized resource. Shadow maps, matrix buffers
    /// and the light buffer do not track the surface and are kept. A resize
    /// to the current dimensions leaves all GPU resources unchanged.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        surface_width: u32,
        surface_height: u32,
        settings: &Settings,
    ) {
        if surface_width == self.screen.surface_width
            && surface_height == self.screen.surface_height
        {
            return;
        }
        self.screen.destroy();
        self.screen = ScreenTargets::new(device, surface_width, surface_height, settings);
    }

    pub fn destroy(&self) {
        self.screen.destroy();
        self.cascade_map.destroy();
        self.spot_atlas.destroy();
        self.cascade_matrices.destroy();
        self.spot_matrices.destroy();
        self.light_buffer.destroy();
    }
}
