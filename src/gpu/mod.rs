//! GPU device, surface and typed resource wrappers.

pub mod context;
pub mod resources;

pub use context::GpuContext;
pub use resources::{GpuBuffer, GpuTexture, ResourceRegistry, Samplers};

/// Format of every HDR intermediate target.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Format of the depth attachments (scene depth, shadow maps).
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
