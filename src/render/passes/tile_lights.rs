//! Tile light culling: assigns each screen tile the lights affecting it.

use crate::gpu::GpuBuffer;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{storage_entry, uniform_entry};
use crate::render::uniforms::TileCullUniform;

const TILE_LIGHTS_WGSL: &str = include_str!("../../shaders/tile_lights.wgsl");

pub struct TileLightPass {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,
    tiles: (u32, u32),
}

impl TileLightPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Light Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
            ],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tile Light Shader"),
            source: wgpu::ShaderSource::Wgsl(TILE_LIGHTS_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Light Pipeline Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Tile Light Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("cs_cull"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self {
            pipeline,
            layout,
            uniform: GpuBuffer::new_uniform(
                device,
                "Tile Light Uniform",
                std::mem::size_of::<TileCullUniform>() as u64,
            ),
            bind_group: None,
            tiles: (0, 0),
        }
    }
}

impl RenderNode for TileLightPass {
    fn name(&self) -> &'static str {
        "Tile Light Cull Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let screen = &ctx.targets.screen;
        self.tiles = (screen.tile_count_x, screen.tile_count_y);

        let uniform = TileCullUniform {
            view: ctx.camera.view_matrix,
            proj: ctx.camera.projection_matrix,
            screen: glam::Vec4::new(
                screen.width as f32,
                screen.height as f32,
                screen.tile_count_x as f32,
                screen.tile_count_y as f32,
            ),
            counts: [
                ctx.light_count,
                ctx.settings.lighting.max_lights_per_tile,
                ctx.settings.lighting.tile_size.max(8),
                0,
            ],
        };
        self.uniform.write(&ctx.gpu.queue, &[uniform]);

        self.bind_group = Some(ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Light BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ctx.targets.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: screen.tile_light_buffer.as_entire_binding(),
                },
            ],
        }));
    }

    fn run(&self, _ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Tile Light Cull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(self.tiles.0, self.tiles.1, 1);
    }
}
