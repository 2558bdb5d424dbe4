//! Materials: texture set plus scalar surface parameters.

use std::sync::Arc;

use glam::Vec3;

use crate::gpu::GpuTexture;

/// Alpha handling in the geometry pass. The deferred pipeline has no blend
/// stage, so partial transparency is expressed through hashed discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Hashed alpha test: hard cut at 0.5, dithered between 0.5 and 1.
    Hash,
}

/// Decoded RGBA8 image handed over by the (external) image decoder.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub srgb: bool,
}

impl TextureData {
    /// Uploads to a sampled 2D texture.
    #[must_use]
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> GpuTexture {
        let format = if self.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let tex = GpuTexture::new_2d(
            device,
            label,
            self.width,
            self.height,
            format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        queue.write_texture(
            tex.texture.as_image_copy(),
            &self.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        tex
    }
}

/// Texture set + scalar parameters for one mesh surface.
///
/// Missing textures fall back to registry placeholders at bind time, so a
/// material with no maps still renders.
pub struct Material {
    pub albedo: Option<Arc<GpuTexture>>,
    pub normal: Option<Arc<GpuTexture>>,
    /// Occlusion / roughness / metallic packed map.
    pub arm: Option<Arc<GpuTexture>>,
    pub emissive: Option<Arc<GpuTexture>>,

    pub alpha_mode: AlphaMode,
    pub opacity: f32,
    pub double_sided: bool,
    /// Multiplies the emissive map; also the emissive color when no map.
    pub emissive_factor: Vec3,
    /// Weight of the synthetic specular boost, written to the ARM alpha.
    pub specular_boost: f32,
    /// Legacy assets where pure black means transparent.
    pub luminance_alpha: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: None,
            normal: None,
            arm: None,
            emissive: None,
            alpha_mode: AlphaMode::Opaque,
            opacity: 1.0,
            double_sided: false,
            emissive_factor: Vec3::ZERO,
            specular_boost: 0.0,
            luminance_alpha: false,
        }
    }
}
