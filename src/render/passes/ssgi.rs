//! Screen-space global illumination.
//!
//! Three stages over screen tiles (tile size independent of the light
//! culling tiles): accumulate the previous frame's HDR plus boosted
//! emissive per tile, propagate tile light along the four screen directions
//! with linear distance falloff, then resolve at half resolution with a
//! Vogel-disk gather weighted by surface-normal projection. The lighting
//! shader samples the resolve target.

use glam::Vec4;

use crate::gpu::{GpuBuffer, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    fullscreen_pipeline, sampler_entry, storage_entry, texture_entry, uniform_entry,
};

const SSGI_ACCUM_WGSL: &str = include_str!("../../shaders/ssgi_accum.wgsl");
const SSGI_PROPAGATE_WGSL: &str = include_str!("../../shaders/ssgi_propagate.wgsl");
const SSGI_RESOLVE_WGSL: &str = include_str!("../../shaders/ssgi_resolve.wgsl");

pub struct SsgiPass {
    accum_pipeline: wgpu::ComputePipeline,
    accum_layout: wgpu::BindGroupLayout,
    propagate_pipeline: wgpu::ComputePipeline,
    propagate_layout: wgpu::BindGroupLayout,
    resolve_pipeline: wgpu::RenderPipeline,
    resolve_layout: wgpu::BindGroupLayout,

    uniform: GpuBuffer,
    accum_bind_group: Option<wgpu::BindGroup>,
    propagate_bind_group: Option<wgpu::BindGroup>,
    resolve_bind_group: Option<wgpu::BindGroup>,
    tiles: (u32, u32),
    enabled: bool,
}

impl SsgiPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = |label: &str, source: &str, entry: &str, layout: &wgpu::BindGroupLayout| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[Some(layout)],
                immediate_size: 0,
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        let accum_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSGI Accum Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                texture_entry(1), // previous frame HDR
                texture_entry(2), // emission
                storage_entry(3, wgpu::ShaderStages::COMPUTE, false),
            ],
        });
        let propagate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSGI Propagate Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
            ],
        });
        let resolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSGI Resolve Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                storage_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                texture_entry(2), // normals
                texture_entry(3), // noise
                sampler_entry(4),
            ],
        });

        let accum_pipeline = compute("SSGI Accum", SSGI_ACCUM_WGSL, "cs_accumulate", &accum_layout);
        let propagate_pipeline = compute(
            "SSGI Propagate",
            SSGI_PROPAGATE_WGSL,
            "cs_propagate",
            &propagate_layout,
        );
        let resolve_pipeline = fullscreen_pipeline(
            device,
            "SSGI Resolve",
            &resolve_layout,
            SSGI_RESOLVE_WGSL,
            "fs_resolve",
            &[Some(HDR_FORMAT.into())],
        );

        Self {
            accum_pipeline,
            accum_layout,
            propagate_pipeline,
            propagate_layout,
            resolve_pipeline,
            resolve_layout,
            uniform: GpuBuffer::new_uniform(device, "SSGI Uniform", 32),
            accum_bind_group: None,
            propagate_bind_group: None,
            resolve_bind_group: None,
            tiles: (0, 0),
            enabled: false,
        }
    }
}

impl RenderNode for SsgiPass {
    fn name(&self) -> &'static str {
        "SSGI Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.enabled = ctx.settings.ssgi.enabled;
        if !self.enabled {
            return;
        }
        let device = &ctx.gpu.device;
        let screen = &ctx.targets.screen;
        let cfg = &ctx.settings.ssgi;
        self.tiles = (screen.ssgi_tiles_x, screen.ssgi_tiles_y);

        self.uniform.write(
            &ctx.gpu.queue,
            &[
                Vec4::new(
                    screen.ssgi_tiles_x as f32,
                    screen.ssgi_tiles_y as f32,
                    cfg.tile_size as f32,
                    cfg.half_screen_tiles as f32,
                ),
                Vec4::new(
                    cfg.max_brightness,
                    cfg.emissive_boost,
                    cfg.intensity,
                    ctx.frame_index as f32,
                ),
            ],
        );

        self.accum_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSGI Accum BindGroup"),
            layout: &self.accum_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.prev_hdr().view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.emission.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: screen.ssgi_accum.as_entire_binding(),
                },
            ],
        }));
        self.propagate_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSGI Propagate BindGroup"),
            layout: &self.propagate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: screen.ssgi_accum.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: screen.ssgi_propagate.as_entire_binding(),
                },
            ],
        }));
        self.resolve_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSGI Resolve BindGroup"),
            layout: &self.resolve_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: screen.ssgi_propagate.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&screen.gbuffer.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ctx.registry.noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_clamp),
                },
            ],
        }));
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        if !self.enabled {
            return;
        }
        let (Some(accum), Some(propagate), Some(resolve)) = (
            &self.accum_bind_group,
            &self.propagate_bind_group,
            &self.resolve_bind_group,
        ) else {
            return;
        };

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("SSGI Accumulate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.accum_pipeline);
            pass.set_bind_group(0, accum, &[]);
            pass.dispatch_workgroups(self.tiles.0, self.tiles.1, 1);

            pass.set_pipeline(&self.propagate_pipeline);
            pass.set_bind_group(0, propagate, &[]);
            pass.dispatch_workgroups(self.tiles.0.div_ceil(8), self.tiles.1.div_ceil(8), 1);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SSGI Resolve"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.screen.ssgi_resolve.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(&self.resolve_pipeline);
        pass.set_bind_group(0, resolve, &[]);
        pass.draw(0..3, 0..1);
    }
}
