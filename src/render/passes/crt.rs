//! CRT pass: barrel distortion, scanlines, phosphor mask, convergence,
//! vignette. Disabled, it degrades to a plain blit of the LDR image onto
//! the surface.

use glam::Vec4;

use crate::gpu::GpuBuffer;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{fullscreen_pipeline, sampler_entry, texture_entry, uniform_entry};
use crate::settings::CrtMaskKind;

const CRT_WGSL: &str = include_str!("../../shaders/crt.wgsl");

pub struct CrtPass {
    crt_pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,
    enabled: bool,
}

impl CrtPass {
    #[must_use]
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CRT Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                sampler_entry(2),
            ],
        });
        Self {
            crt_pipeline: fullscreen_pipeline(
                device,
                "CRT Pipeline",
                &layout,
                CRT_WGSL,
                "fs_crt",
                &[Some(surface_format.into())],
            ),
            blit_pipeline: fullscreen_pipeline(
                device,
                "Blit Pipeline",
                &layout,
                CRT_WGSL,
                "fs_blit",
                &[Some(surface_format.into())],
            ),
            layout,
            uniform: GpuBuffer::new_uniform(device, "CRT Uniform", 3 * 16),
            bind_group: None,
            enabled: false,
        }
    }

    /// Draws onto the acquired surface view.
    pub fn run_to_surface(
        &self,
        _ctx: &FrameContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
    ) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("CRT"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(if self.enabled {
            &self.crt_pipeline
        } else {
            &self.blit_pipeline
        });
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

impl RenderNode for CrtPass {
    fn name(&self) -> &'static str {
        "CRT Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let cfg = &ctx.settings.crt;
        self.enabled = cfg.enabled;

        let mask_kind = match cfg.mask {
            CrtMaskKind::Aperture => 0.0,
            CrtMaskKind::Slot => 1.0,
            CrtMaskKind::Shadow => 2.0,
        };
        self.uniform.write(
            &ctx.gpu.queue,
            &[
                Vec4::new(cfg.curvature, cfg.corner_radius, cfg.scanline_strength, cfg.beam_widening),
                Vec4::new(cfg.convergence, mask_kind, cfg.mask_strength, cfg.vignette),
                Vec4::new(
                    cfg.horizontal_blur,
                    ctx.targets.screen.surface_height as f32,
                    0.0,
                    0.0,
                ),
            ],
        );

        self.bind_group = Some(ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CRT BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.screen.ldr.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
            ],
        }));
    }

    fn run(&self, _ctx: &FrameContext<'_>, _encoder: &mut wgpu::CommandEncoder) {
        // Drawing happens through `run_to_surface`, which the graph calls
        // with the acquired swapchain view.
    }
}
