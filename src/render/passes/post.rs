//! Post pass: FXAA, ACES tonemap, ordered dithering, GUI composite.
//!
//! Reads the final HDR scene color and writes the LDR texture consumed by
//! the CRT pass (or blitted straight to the surface when CRT is off). The
//! GUI texture is an external input; a transparent placeholder is bound
//! when the host supplies none.

use glam::Vec4;

use crate::gpu::GpuBuffer;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{fullscreen_pipeline, sampler_entry, texture_entry, uniform_entry};

const POST_WGSL: &str = include_str!("../../shaders/post.wgsl");

pub struct PostPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,
    /// Host-provided overlay, composited over the tonemapped image.
    gui_view: Option<wgpu::TextureView>,
}

impl PostPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        let pipeline = fullscreen_pipeline(
            device,
            "Post Pipeline",
            &layout,
            POST_WGSL,
            "fs_post",
            &[Some(wgpu::TextureFormat::Rgba8Unorm.into())],
        );
        Self {
            pipeline,
            layout,
            uniform: GpuBuffer::new_uniform(device, "Post Uniform", 16),
            bind_group: None,
            gui_view: None,
        }
    }

    /// Sets (or clears) the external GUI overlay texture.
    pub fn set_gui_view(&mut self, view: Option<wgpu::TextureView>) {
        self.gui_view = view;
    }
}

impl RenderNode for PostPass {
    fn name(&self) -> &'static str {
        "Post Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.uniform.write(
            &ctx.gpu.queue,
            &[Vec4::new(
                f32::from(u8::from(ctx.settings.rendering.fxaa)),
                f32::from(u8::from(ctx.settings.dithering.enabled)),
                ctx.settings.dithering.levels.max(2) as f32,
                0.0,
            )],
        );

        let gui = self
            .gui_view
            .as_ref()
            .unwrap_or(&ctx.registry.transparent.view);
        self.bind_group = Some(ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Post BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.hdr().view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(gui),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
            ],
        }));
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Post"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.screen.ldr.view,
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
