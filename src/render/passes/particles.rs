//! GPU particles: compute spawn + simulate, billboard render.
//!
//! A fixed-capacity particle buffer lives on the GPU. Hosts queue spawn
//! requests; the spawn kernel claims free slots through an atomic flag
//! array (up to 8 probes per request) and maintains the alive counter. The
//! simulate kernel integrates motion, ages particles and exponentially
//! smooths per-particle lighting toward a freshly sampled target. Rendering
//! pulls particles from the storage buffer, 6 vertices per particle, with
//! alpha-blended and additive pipelines selected by a flag bit.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::gpu::{GpuBuffer, GpuContext, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    depth_texture_entry, storage_entry, uniform_entry,
};
use crate::render::targets::MAX_CASCADES;
use crate::settings::Settings;

const PARTICLES_SIM_WGSL: &str = include_str!("../../shaders/particles_sim.wgsl");
const PARTICLES_DRAW_WGSL: &str = include_str!("../../shaders/particles_draw.wgsl");

/// Particle GPU record stride (see `Particle` in the simulation shader).
pub const PARTICLE_STRIDE: u64 = 80;
/// Spawn requests accepted per frame.
pub const MAX_SPAWNS_PER_FRAME: usize = 1024;

bitflags::bitflags! {
    /// Per-particle behavior bits, mirrored by the shaders.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ParticleFlags: u32 {
        /// Additive blending instead of alpha.
        const ADDITIVE = 1;
    }
}

/// One host-side spawn request, mirrored by the spawn kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct ParticleSpawn {
    pub position: [f32; 3],
    pub lifetime: f32,
    pub velocity: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
    pub rotation: f32,
    pub flags: u32,
    pub seed: u32,
    pub _pad: u32,
}

pub struct ParticlePass {
    spawn_pipeline: wgpu::ComputePipeline,
    simulate_pipeline: wgpu::ComputePipeline,
    sim_layout: wgpu::BindGroupLayout,
    render_alpha: wgpu::RenderPipeline,
    render_additive: wgpu::RenderPipeline,
    render_layout: wgpu::BindGroupLayout,

    particle_buffer: GpuBuffer,
    alive_flags: GpuBuffer,
    counter: GpuBuffer,
    spawn_buffer: GpuBuffer,
    uniform: GpuBuffer,

    sim_bind_group: Option<wgpu::BindGroup>,
    render_bind_group: Option<wgpu::BindGroup>,
    render_target: Option<wgpu::TextureView>,

    capacity: u32,
    pending: Vec<ParticleSpawn>,
    spawn_count: u32,
}

impl ParticlePass {
    #[must_use]
    pub fn new(gpu: &GpuContext, settings: &Settings) -> Self {
        let device = &gpu.device;
        let capacity = settings.performance.particle_capacity.max(64);

        let sim_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Sim Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, false), // particles
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false), // alive flags (atomic)
                storage_entry(3, wgpu::ShaderStages::COMPUTE, false), // counter
                storage_entry(4, wgpu::ShaderStages::COMPUTE, true),  // spawn requests
                storage_entry(5, wgpu::ShaderStages::COMPUTE, true),  // lights
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                storage_entry(8, wgpu::ShaderStages::COMPUTE, true), // cascade matrices
            ],
        });

        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Render Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::VERTEX_FRAGMENT),
                storage_entry(2, wgpu::ShaderStages::VERTEX, true),
                depth_texture_entry(3),
            ],
        });

        let sim_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Sim Shader"),
            source: wgpu::ShaderSource::Wgsl(PARTICLES_SIM_WGSL.into()),
        });
        let sim_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Sim Pipeline Layout"),
            bind_group_layouts: &[Some(&sim_layout)],
            immediate_size: 0,
        });
        let compute = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&sim_pipeline_layout),
                module: &sim_module,
                entry_point: Some(entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        let draw_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Draw Shader"),
            source: wgpu::ShaderSource::Wgsl(PARTICLES_DRAW_WGSL.into()),
        });
        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Particle Render Pipeline Layout"),
                bind_group_layouts: &[Some(&render_layout)],
                immediate_size: 0,
            });
        let render = |entry: &str, blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(entry),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &draw_module,
                    entry_point: Some("vs_particle"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &draw_module,
                    entry_point: Some(entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };
        let additive_blend = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        };

        Self {
            spawn_pipeline: compute("cs_spawn"),
            simulate_pipeline: compute("cs_simulate"),
            sim_layout,
            render_alpha: render("fs_alpha", wgpu::BlendState::ALPHA_BLENDING),
            render_additive: render("fs_additive", additive_blend),
            render_layout,
            particle_buffer: GpuBuffer::new_storage(
                device,
                "Particle Buffer",
                u64::from(capacity) * PARTICLE_STRIDE,
            ),
            alive_flags: GpuBuffer::new_storage(device, "Particle Alive Flags", u64::from(capacity) * 4),
            counter: GpuBuffer::new_storage(device, "Particle Counter", 16),
            spawn_buffer: GpuBuffer::new_storage(
                device,
                "Particle Spawn Ring",
                (MAX_SPAWNS_PER_FRAME * std::mem::size_of::<ParticleSpawn>()) as u64,
            ),
            uniform: GpuBuffer::new_uniform(device, "Particle Uniform", 6 * 16),
            sim_bind_group: None,
            render_bind_group: None,
            render_target: None,
            capacity,
            pending: Vec::new(),
            spawn_count: 0,
        }
    }

    /// Queues spawn requests for the next simulate pass. Requests past the
    /// per-frame budget are dropped.
    pub fn queue_spawns(&mut self, spawns: &[ParticleSpawn]) {
        let room = MAX_SPAWNS_PER_FRAME.saturating_sub(self.pending.len());
        if spawns.len() > room {
            log::debug!("Particle spawn budget hit, dropping {}", spawns.len() - room);
        }
        self.pending.extend_from_slice(&spawns[..spawns.len().min(room)]);
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl RenderNode for ParticlePass {
    fn name(&self) -> &'static str {
        "Particle Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let device = &ctx.gpu.device;
        let queue = &ctx.gpu.queue;

        self.spawn_count = self.pending.len() as u32;
        if !self.pending.is_empty() {
            self.spawn_buffer.write(queue, &self.pending);
            self.pending.clear();
        }

        let uniform: [Vec4; 6] = [
            Vec4::new(ctx.dt, ctx.time, self.capacity as f32, self.spawn_count as f32),
            // (gravity, drag, turbulence, light count)
            Vec4::new(-9.81, 0.12, 0.6, ctx.light_count as f32),
            Vec4::from_array(ctx.settings.main_light.color),
            Vec3::from_array(ctx.settings.main_light.direction)
                .normalize_or(Vec3::NEG_Y)
                .extend(ctx.settings.shadow.cascade_count.clamp(1, MAX_CASCADES) as f32),
            {
                let mut sizes = [0.0f32; 4];
                for (i, s) in ctx.settings.shadow.cascade_sizes.iter().take(4).enumerate() {
                    sizes[i] = *s;
                }
                Vec4::from_array(sizes)
            },
            ctx.camera.position.extend(0.0),
        ];
        self.uniform.write(queue, &uniform);

        self.sim_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Sim BindGroup"),
            layout: &self.sim_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.alive_flags.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.spawn_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: ctx.targets.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.cascade_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::Sampler(
                        &ctx.registry.samplers.shadow_compare,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: ctx.targets.cascade_matrices.as_entire_binding(),
                },
            ],
        }));

        self.render_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Render BindGroup"),
            layout: &self.render_layout,
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
                    resource: self.particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.depth().view),
                },
            ],
        }));
        self.render_target = Some(ctx.targets.hdr().view.clone());
    }

    fn run(&self, _ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let (Some(sim), Some(render), Some(target)) = (
            &self.sim_bind_group,
            &self.render_bind_group,
            &self.render_target,
        ) else {
            return;
        };

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Particle Simulate"),
                timestamp_writes: None,
            });
            if self.spawn_count > 0 {
                pass.set_pipeline(&self.spawn_pipeline);
                pass.set_bind_group(0, sim, &[]);
                pass.dispatch_workgroups(self.spawn_count.div_ceil(64), 1, 1);
            }
            pass.set_pipeline(&self.simulate_pipeline);
            pass.set_bind_group(0, sim, &[]);
            pass.dispatch_workgroups(self.capacity.div_ceil(64), 1, 1);
        }

        // Compute-to-render read of the just-simulated state; single
        // buffered since the frame completes the read before the next
        // simulate writes.
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Render"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(&self.render_alpha);
        pass.set_bind_group(0, render, &[]);
        pass.draw(0..self.capacity * 6, 0..1);
        pass.set_pipeline(&self.render_additive);
        pass.set_bind_group(0, render, &[]);
        pass.draw(0..self.capacity * 6, 0..1);
    }
}
