//! Volumetric fog: low-resolution ray-march, separable blur, composite.
//!
//! The march walks each camera ray through a world-Y slab, sampling fbm
//! density, cascade shadows for the main light and the tiled lights with
//! isotropic phase. A separable Gaussian softens the low-res result and the
//! composite adds it over the scene color with luminance-based visibility
//! attenuation (bright and sky pixels show less fog).

use glam::{Vec3, Vec4};

use crate::gpu::{GpuBuffer, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    depth_texture_entry, fullscreen_pipeline, sampler_entry, storage_entry, texture_entry,
    uniform_entry,
};
use crate::render::targets::{MAX_CASCADES, SPOT_TILES_PER_ROW};

const FOG_MARCH_WGSL: &str = include_str!("../../shaders/fog_march.wgsl");
const FOG_BLUR_WGSL: &str = include_str!("../../shaders/fog_blur.wgsl");
const FOG_COMPOSITE_WGSL: &str = include_str!("../../shaders/fog_composite.wgsl");

pub struct VolumetricFogPass {
    march_pipeline: wgpu::RenderPipeline,
    march_layout: wgpu::BindGroupLayout,
    blur_pipeline: wgpu::RenderPipeline,
    blur_layout: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    composite_layout: wgpu::BindGroupLayout,

    fog_uniform: GpuBuffer,
    blur_h_uniform: GpuBuffer,
    blur_v_uniform: GpuBuffer,

    march_bind_group: Option<wgpu::BindGroup>,
    blur_h_bind_group: Option<wgpu::BindGroup>,
    blur_v_bind_group: Option<wgpu::BindGroup>,
    composite_bind_group: Option<wgpu::BindGroup>,
    composite_target: Option<wgpu::TextureView>,
    enabled: bool,
}

impl VolumetricFogPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let march_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fog March Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                depth_texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                depth_texture_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                storage_entry(6, wgpu::ShaderStages::FRAGMENT, true),
                storage_entry(7, wgpu::ShaderStages::FRAGMENT, true),
                storage_entry(8, wgpu::ShaderStages::FRAGMENT, true),
                storage_entry(9, wgpu::ShaderStages::FRAGMENT, true),
            ],
        });
        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fog Blur Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                sampler_entry(2),
            ],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fog Composite Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });

        Self {
            march_pipeline: fullscreen_pipeline(
                device,
                "Fog March",
                &march_layout,
                FOG_MARCH_WGSL,
                "fs_march",
                &[Some(HDR_FORMAT.into())],
            ),
            march_layout,
            blur_pipeline: fullscreen_pipeline(
                device,
                "Fog Blur",
                &blur_layout,
                FOG_BLUR_WGSL,
                "fs_blur",
                &[Some(HDR_FORMAT.into())],
            ),
            blur_layout,
            composite_pipeline: fullscreen_pipeline(
                device,
                "Fog Composite",
                &composite_layout,
                FOG_COMPOSITE_WGSL,
                "fs_composite",
                &[Some(HDR_FORMAT.into())],
            ),
            composite_layout,
            fog_uniform: GpuBuffer::new_uniform(device, "Fog Uniform", 8 * 16),
            blur_h_uniform: GpuBuffer::new_uniform(device, "Fog Blur H", 16),
            blur_v_uniform: GpuBuffer::new_uniform(device, "Fog Blur V", 16),
            march_bind_group: None,
            blur_h_bind_group: None,
            blur_v_bind_group: None,
            composite_bind_group: None,
            composite_target: None,
            enabled: false,
        }
    }
}

impl RenderNode for VolumetricFogPass {
    fn name(&self) -> &'static str {
        "Volumetric Fog Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.enabled = ctx.settings.volumetric_fog.enabled;
        if !self.enabled {
            return;
        }
        let device = &ctx.gpu.device;
        let screen = &ctx.targets.screen;
        let cfg = &ctx.settings.volumetric_fog;
        let shadow = &ctx.settings.shadow;

        let mut cascade_sizes = [0.0f32; 4];
        for (i, s) in shadow.cascade_sizes.iter().take(4).enumerate() {
            cascade_sizes[i] = *s;
        }
        let uniform: [Vec4; 8] = [
            Vec4::new(cfg.bottom_y, cfg.top_y, cfg.density, cfg.max_samples as f32),
            Vec4::new(
                cfg.noise_scale,
                f32::from(u8::from(cfg.animated)),
                ctx.time,
                cfg.blur_radius,
            ),
            Vec4::new(
                cfg.min_visibility,
                cfg.brightness_threshold,
                cfg.sky_brightness,
                0.6, // Henyey-Greenstein g
            ),
            Vec3::from_array(cfg.color).extend(0.4), // w = phase floor
            Vec4::from_array(cascade_sizes),
            Vec4::new(
                shadow.cascade_count.clamp(1, MAX_CASCADES) as f32,
                screen.tile_count_x as f32,
                ctx.settings.lighting.max_lights_per_tile as f32,
                ctx.settings.lighting.tile_size.max(8) as f32,
            ),
            Vec4::from_array(ctx.settings.main_light.color),
            Vec3::from_array(ctx.settings.main_light.direction)
                .normalize_or(Vec3::NEG_Y)
                .extend(SPOT_TILES_PER_ROW as f32),
        ];
        self.fog_uniform.write(&ctx.gpu.queue, &uniform);

        let texel = Vec4::new(
            1.0 / screen.fog_color.width as f32,
            1.0 / screen.fog_color.height as f32,
            cfg.blur_radius,
            0.0,
        );
        self.blur_h_uniform
            .write(&ctx.gpu.queue, &[Vec4::new(texel.x, 0.0, texel.z, 0.0)]);
        self.blur_v_uniform
            .write(&ctx.gpu.queue, &[Vec4::new(0.0, texel.y, texel.z, 0.0)]);

        self.march_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fog March BindGroup"),
            layout: &self.march_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.fog_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.depth().view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.cascade_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.spot_atlas.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(
                        &ctx.registry.samplers.shadow_compare,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: ctx.targets.cascade_matrices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: ctx.targets.spot_matrices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: ctx.targets.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: screen.tile_light_buffer.as_entire_binding(),
                },
            ],
        }));

        let blur_bind = |uniform: &GpuBuffer, source: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Fog Blur BindGroup"),
                layout: &self.blur_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(source),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(
                            &ctx.registry.samplers.linear_clamp,
                        ),
                    },
                ],
            })
        };
        self.blur_h_bind_group = Some(blur_bind(&self.blur_h_uniform, &screen.fog_color.view));
        self.blur_v_bind_group = Some(blur_bind(&self.blur_v_uniform, &screen.fog_blur.view));

        // Composite reads the current scene color and the blurred fog,
        // writes the other HDR buffer; the graph flips after this prepare.
        self.composite_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fog Composite BindGroup"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.fog_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.hdr().view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&screen.fog_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
            ],
        }));
        self.composite_target = Some(ctx.targets.prev_hdr().view.clone());
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        if !self.enabled {
            return;
        }
        let (Some(march), Some(blur_h), Some(blur_v), Some(composite), Some(target)) = (
            &self.march_bind_group,
            &self.blur_h_bind_group,
            &self.blur_v_bind_group,
            &self.composite_bind_group,
            &self.composite_target,
        ) else {
            return;
        };
        let screen = &ctx.targets.screen;

        let fullscreen = |encoder: &mut wgpu::CommandEncoder,
                          label: &str,
                          view: &wgpu::TextureView,
                          pipeline: &wgpu::RenderPipeline,
                          bind_group: &wgpu::BindGroup| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        };

        fullscreen(encoder, "Fog March", &screen.fog_color.view, &self.march_pipeline, march);
        fullscreen(encoder, "Fog Blur H", &screen.fog_blur.view, &self.blur_pipeline, blur_h);
        fullscreen(encoder, "Fog Blur V", &screen.fog_color.view, &self.blur_pipeline, blur_v);
        fullscreen(encoder, "Fog Composite", target, &self.composite_pipeline, composite);
    }
}
