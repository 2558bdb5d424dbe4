//! Deferred lighting pass.
//!
//! One full-screen triangle consuming the whole G-buffer, the shadow
//! atlases and matrix buffers, the tiled light list, the environment map,
//! SSAO, the SSGI resolve and the planar reflection. Produces the HDR scene
//! color.

use glam::{Vec3, Vec4};

use crate::gpu::{GpuBuffer, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    depth_texture_entry, sampler_entry, storage_entry, texture_entry, uniform_entry,
};
use crate::render::targets::{MAX_CASCADES, SPOT_TILES_PER_ROW};
use crate::render::uniforms::LightingUniform;

const LIGHTING_WGSL: &str = include_str!("../../shaders/lighting.wgsl");

pub struct LightingPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,
    output_view: Option<wgpu::TextureView>,
}

impl LightingPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let cascade_array_entry = wgpu::BindGroupLayoutEntry {
            binding: 7,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2Array,
                multisampled: false,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lighting Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                texture_entry(2),       // albedo
                texture_entry(3),       // normal
                texture_entry(4),       // arm
                texture_entry(5),       // emission
                depth_texture_entry(6), // scene depth
                cascade_array_entry,    // cascade depth array
                depth_texture_entry(8), // spot atlas
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                sampler_entry(10),
                texture_entry(11), // environment RGBE
                storage_entry(12, wgpu::ShaderStages::FRAGMENT, true), // cascade matrices
                storage_entry(13, wgpu::ShaderStages::FRAGMENT, true), // spot matrices
                storage_entry(14, wgpu::ShaderStages::FRAGMENT, true), // lights
                storage_entry(15, wgpu::ShaderStages::FRAGMENT, true), // tile lists
                texture_entry(16), // noise
                texture_entry(17), // ssao
                texture_entry(18), // ssgi resolve
                texture_entry(19), // planar reflection
            ],
        });

        let pipeline = super::fullscreen_pipeline(
            device,
            "Lighting Pipeline",
            &layout,
            LIGHTING_WGSL,
            "fs_lighting",
            &[Some(HDR_FORMAT.into())],
        );

        Self {
            pipeline,
            layout,
            uniform: GpuBuffer::new_uniform(
                device,
                "Lighting Uniform",
                std::mem::size_of::<LightingUniform>() as u64,
            ),
            bind_group: None,
            output_view: None,
        }
    }

    fn build_uniform(ctx: &FrameContext<'_>) -> LightingUniform {
        let settings = ctx.settings;
        let screen = &ctx.targets.screen;
        let cascade_count = settings.shadow.cascade_count.clamp(1, MAX_CASCADES);
        let mut cascade_sizes = [0.0f32; 4];
        for (i, size) in settings.shadow.cascade_sizes.iter().take(4).enumerate() {
            cascade_sizes[i] = *size;
        }
        LightingUniform {
            counts: [
                cascade_count,
                screen.tile_count_x,
                settings.lighting.max_lights_per_tile,
                settings.lighting.tile_size.max(8),
            ],
            cascade_sizes: Vec4::from_array(cascade_sizes),
            shadow_params: Vec4::new(
                settings.shadow.bias,
                settings.shadow.normal_bias,
                settings.shadow.strength,
                settings.shadow.map_size as f32,
            ),
            environment: Vec4::new(
                settings.environment.diffuse,
                settings.environment.specular,
                settings.environment.exposure,
                ctx.environment.encoding.as_u32() as f32,
            ),
            main_color: Vec4::from_array(settings.main_light.color),
            main_direction: Vec3::from_array(settings.main_light.direction)
                .normalize_or(Vec3::NEG_Y)
                .extend(0.0),
            gi_params: Vec4::new(
                settings.ssgi.intensity,
                f32::from(u8::from(settings.ssgi.enabled)),
                settings.ao.strength,
                0.35,
            ),
            specular: Vec4::new(
                settings.lighting.specular_boost,
                settings.lighting.specular_boost_roughness_cutoff,
                settings.lighting.direct_specular_multiplier,
                SPOT_TILES_PER_ROW as f32,
            ),
            planar: Vec4::new(
                f32::from(u8::from(settings.planar_reflection.enabled)),
                settings.planar_reflection.plane_y,
                settings.planar_reflection.intensity,
                settings.planar_reflection.fade_height,
            ),
            env_fog: Vec4::new(
                f32::from(u8::from(settings.environment.fog.enabled)),
                settings.environment.fog.start,
                settings.environment.fog.end,
                0.0,
            ),
            env_fog_color: Vec3::from_array(settings.environment.fog.color).extend(1.0),
        }
    }
}

impl RenderNode for LightingPass {
    fn name(&self) -> &'static str {
        "Lighting Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let device = &ctx.gpu.device;
        let screen = &ctx.targets.screen;
        self.uniform.write(&ctx.gpu.queue, &[Self::build_uniform(ctx)]);
        // The scene color index moves during later composites; pin the
        // output now.
        self.output_view = Some(ctx.targets.hdr().view.clone());

        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lighting BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.arm.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.emission.view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.depth().view),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.cascade_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.spot_atlas.view),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(
                        &ctx.registry.samplers.shadow_compare,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
                wgpu::BindGroupEntry {
                    binding: 11,
                    resource: wgpu::BindingResource::TextureView(&ctx.environment.texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 12,
                    resource: ctx.targets.cascade_matrices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 13,
                    resource: ctx.targets.spot_matrices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 14,
                    resource: ctx.targets.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 15,
                    resource: screen.tile_light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 16,
                    resource: wgpu::BindingResource::TextureView(&ctx.registry.noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 17,
                    resource: wgpu::BindingResource::TextureView(&screen.ssao.view),
                },
                wgpu::BindGroupEntry {
                    binding: 18,
                    resource: wgpu::BindingResource::TextureView(&screen.ssgi_resolve.view),
                },
                wgpu::BindGroupEntry {
                    binding: 19,
                    resource: wgpu::BindingResource::TextureView(&screen.planar_color.view),
                },
            ],
        }));
    }

    fn run(&self, _ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let (Some(bind_group), Some(output_view)) = (&self.bind_group, &self.output_view) else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Deferred Lighting"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
