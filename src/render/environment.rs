//! Environment texture and IBL inputs.
//!
//! The environment is one 2D texture holding RGBE-packed radiance, either
//! equirectangular or octahedral. Decoding from HDR or RGBM pairs is an
//! external collaborator; the engine receives decoded RGBE pixels and an
//! encoding flag that the sky and IBL samplers read as a scalar uniform.

use crate::gpu::GpuTexture;

/// Environment map layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvEncoding {
    #[default]
    Equirectangular,
    Octahedral,
}

impl EnvEncoding {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            EnvEncoding::Equirectangular => 0,
            EnvEncoding::Octahedral => 1,
        }
    }
}

pub struct Environment {
    pub texture: GpuTexture,
    pub encoding: EnvEncoding,
}

impl Environment {
    /// Built-in vertical gradient used until the host provides a map.
    #[must_use]
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        const W: u32 = 64;
        const H: u32 = 32;
        let mut pixels = Vec::with_capacity((W * H * 4) as usize);
        for y in 0..H {
            let t = y as f32 / (H - 1) as f32;
            // Horizon-tinted gradient, RGBE with exponent bias 128.
            let rgb = [
                0.18 + 0.4 * t,
                0.28 + 0.42 * t,
                0.45 + 0.4 * t,
            ];
            for _ in 0..W {
                pixels.extend_from_slice(&encode_rgbe(rgb));
            }
        }
        Self {
            texture: upload_rgbe(device, queue, W, H, &pixels),
            encoding: EnvEncoding::Equirectangular,
        }
    }

    /// Replaces the environment with decoded RGBE pixels.
    pub fn set_rgbe(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        rgbe_pixels: &[u8],
        encoding: EnvEncoding,
    ) {
        self.texture.destroy();
        self.texture = upload_rgbe(device, queue, width, height, rgbe_pixels);
        self.encoding = encoding;
    }
}

/// Shared-exponent RGBE encode, the CPU-side mirror of the shader decode.
#[must_use]
pub fn encode_rgbe(rgb: [f32; 3]) -> [u8; 4] {
    let max = rgb[0].max(rgb[1]).max(rgb[2]);
    if max < 1e-9 {
        return [0, 0, 0, 0];
    }
    let exponent = max.log2().ceil();
    let scale = (255.0 / max) * (max / exponent.exp2());
    [
        (rgb[0] * scale).clamp(0.0, 255.0) as u8,
        (rgb[1] * scale).clamp(0.0, 255.0) as u8,
        (rgb[2] * scale).clamp(0.0, 255.0) as u8,
        (exponent + 128.0).clamp(0.0, 255.0) as u8,
    ]
}

/// Decode mirror for tests.
#[must_use]
pub fn decode_rgbe(rgbe: [u8; 4]) -> [f32; 3] {
    if rgbe[3] == 0 {
        return [0.0; 3];
    }
    let scale = (f32::from(rgbe[3]) - 128.0).exp2() / 255.0;
    [
        f32::from(rgbe[0]) * scale,
        f32::from(rgbe[1]) * scale,
        f32::from(rgbe[2]) * scale,
    ]
}

fn upload_rgbe(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> GpuTexture {
    let tex = GpuTexture::new_2d(
        device,
        "Environment RGBE",
        width,
        height,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    queue.write_texture(
        tex.texture.as_image_copy(),
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    tex
}
