//! Typed wrappers for GPU resources.
//!
//! Thin ownership types over raw `wgpu` handles. A wrapper owns its handle;
//! dropping it releases the GPU object, and `destroy` forces the release
//! eagerly during teardown. Screen-sized resources are created here but
//! owned by the render graph, never by individual passes.

use rand::RngExt;

/// A GPU buffer together with its byte size.
pub struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    pub size: u64,
}

impl GpuBuffer {
    #[must_use]
    pub fn new(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Self { buffer, size }
    }

    #[must_use]
    pub fn new_uniform(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self::new(
            device,
            label,
            size,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )
    }

    #[must_use]
    pub fn new_storage(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self::new(
            device,
            label,
            size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        )
    }

    /// Uploads `data` starting at byte 0. The slice must fit the buffer.
    pub fn write<T: bytemuck::NoUninit>(&self, queue: &wgpu::Queue, data: &[T]) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }

    #[must_use]
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

/// A GPU texture with its default view and dimensions.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    #[must_use]
    pub fn new_2d(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self::new_layered(device, label, width, height, 1, format, usage)
    }

    /// 2D-array texture; `layers == 1` yields a plain 2D texture.
    #[must_use]
    pub fn new_layered(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        layers: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: layers.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(if layers > 1 {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });
        Self {
            texture,
            view,
            width: width.max(1),
            height: height.max(1),
            layers: layers.max(1),
            format,
        }
    }

    /// Render target with a full mip chain, for the bloom pyramid.
    #[must_use]
    pub fn new_mipped_target(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: width.max(1),
            height: height.max(1),
            layers: 1,
            format,
        }
    }

    /// A single-mip view, used to target one bloom pyramid level.
    #[must_use]
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// Render-attachment + sampled texture, the usual screen target.
    #[must_use]
    pub fn new_render_target(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self::new_2d(
            device,
            label,
            width,
            height,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        )
    }

    /// Depth attachment sampled later as a shadow or depth texture.
    #[must_use]
    pub fn new_depth(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Self {
        Self::new_layered(
            device,
            label,
            width,
            height,
            layers,
            crate::gpu::DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        )
    }

    /// A view of one array layer, used as a depth attachment.
    #[must_use]
    pub fn layer_view(&self, layer: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

// ============================================================================
// Samplers
// ============================================================================

/// The fixed sampler set shared by every pass.
pub struct Samplers {
    pub linear_clamp: wgpu::Sampler,
    pub linear_repeat: wgpu::Sampler,
    pub nearest_clamp: wgpu::Sampler,
    pub shadow_compare: wgpu::Sampler,
}

impl Samplers {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let linear = |label, address| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::MipmapFilterMode::Linear,
                ..Default::default()
            })
        };
        Self {
            linear_clamp: linear("Linear Clamp Sampler", wgpu::AddressMode::ClampToEdge),
            linear_repeat: linear("Linear Repeat Sampler", wgpu::AddressMode::Repeat),
            nearest_clamp: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Nearest Clamp Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            }),
            shadow_compare: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Shadow Compare Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            }),
        }
    }
}

// ============================================================================
// Resource registry (placeholders + noise)
// ============================================================================

/// Engine-owned registry of placeholder and utility resources.
///
/// Pipelines receive this as a dependency instead of reaching into a global;
/// any pass missing an optional input (noise, joint texture, AO) binds the
/// matching placeholder.
pub struct ResourceRegistry {
    pub samplers: Samplers,
    /// 1×1 white `rgba8unorm`.
    pub white: GpuTexture,
    /// 1×1 black `rgba8unorm`.
    pub black: GpuTexture,
    /// 1×1 fully transparent, the stand-in for absent overlay inputs.
    pub transparent: GpuTexture,
    /// 1×1 flat normal (0.5, 0.5, 1.0).
    pub flat_normal: GpuTexture,
    /// 4×1 `rgba32float` identity joint matrix, bound when a batch is rigid.
    pub identity_joints: GpuTexture,
    /// Tileable noise used for dithering, PCF rotation and jitter.
    pub noise: GpuTexture,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, noise_size: u32) -> Self {
        let white = solid_pixel(device, queue, "White Placeholder", [255, 255, 255, 255]);
        let black = solid_pixel(device, queue, "Black Placeholder", [0, 0, 0, 255]);
        let transparent = solid_pixel(device, queue, "Transparent Placeholder", [0, 0, 0, 0]);
        let flat_normal = solid_pixel(device, queue, "Flat Normal Placeholder", [128, 128, 255, 255]);
        let identity_joints = identity_joint_texture(device, queue);
        let noise = noise_texture(device, queue, noise_size.max(16));
        Self {
            samplers: Samplers::new(device),
            white,
            black,
            transparent,
            flat_normal,
            identity_joints,
            noise,
        }
    }
}

fn solid_pixel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    rgba: [u8; 4],
) -> GpuTexture {
    let tex = GpuTexture::new_2d(
        device,
        label,
        1,
        1,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    queue.write_texture(
        tex.texture.as_image_copy(),
        &rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    tex
}

/// One identity matrix in the joint-texture layout: a 4×1 texture whose four
/// texels are the four matrix columns.
fn identity_joint_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
    let tex = GpuTexture::new_2d(
        device,
        "Identity Joint Texture",
        4,
        1,
        wgpu::TextureFormat::Rgba32Float,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    let identity = glam::Mat4::IDENTITY.to_cols_array();
    queue.write_texture(
        tex.texture.as_image_copy(),
        bytemuck::cast_slice(&identity),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(64),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: 4,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    tex
}

/// Tileable RGBA noise. White noise is sufficient for the rotation angles
/// and dither thresholds the shaders draw from it.
fn noise_texture(device: &wgpu::Device, queue: &wgpu::Queue, size: u32) -> GpuTexture {
    let tex = GpuTexture::new_2d(
        device,
        "Noise Texture",
        size,
        size,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    let mut rng = rand::rng();
    let mut data = vec![0u8; (size * size * 4) as usize];
    rng.fill(data.as_mut_slice());
    queue.write_texture(
        tex.texture.as_image_copy(),
        &data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size * 4),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
    );
    tex
}
