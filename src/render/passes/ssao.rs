//! SSAO: Poisson-disk depth-only ambient occlusion at half resolution.

use glam::Vec4;

use crate::gpu::GpuBuffer;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    depth_texture_entry, fullscreen_pipeline, sampler_entry, texture_entry, uniform_entry,
};
use crate::render::targets::SSAO_FORMAT;

const SSAO_WGSL: &str = include_str!("../../shaders/ssao.wgsl");

pub struct SsaoPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    params: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,
    enabled: bool,
}

impl SsaoPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                depth_texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                sampler_entry(5),
            ],
        });
        let pipeline = fullscreen_pipeline(
            device,
            "SSAO Pipeline",
            &layout,
            SSAO_WGSL,
            "fs_ssao",
            &[Some(SSAO_FORMAT.into())],
        );
        Self {
            pipeline,
            layout,
            params: GpuBuffer::new_uniform(device, "SSAO Params", 16),
            bind_group: None,
            enabled: false,
        }
    }
}

impl RenderNode for SsaoPass {
    fn name(&self) -> &'static str {
        "SSAO Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.enabled = ctx.settings.ao.enabled;
        if !self.enabled {
            return;
        }
        let ao = &ctx.settings.ao;
        self.params.write(
            &ctx.gpu.queue,
            &[Vec4::new(ao.radius, ao.strength, ao.samples as f32, 0.0)],
        );

        self.bind_group = Some(ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.depth().view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        &ctx.targets.screen.gbuffer.normal.view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&ctx.registry.noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
            ],
        }));
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SSAO"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.screen.ssao.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        if !self.enabled {
            return;
        }
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
