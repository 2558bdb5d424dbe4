//! G-buffer pass: rasterizes every opaque batch into the attribute targets.
//!
//! Five color attachments (albedo, normal+worldY, ARM+boost, emission,
//! velocity) plus a linear depth write. The vertex stage handles skinning
//! with motion history, billboard modes, TAA jitter with distance fade and
//! the optional pixel/position rounding; the fragment stage handles the
//! clip plane, dithered distance fade, luminance-to-alpha, alpha hashing
//! and the derivative tangent frame.

use std::sync::Arc;

use crate::gpu::{GpuBuffer, DEPTH_FORMAT};
use crate::render::instances::RenderBatch;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::targets::{
    ALBEDO_FORMAT, ARM_FORMAT, EMISSION_FORMAT, NORMAL_FORMAT, VELOCITY_FORMAT,
};
use crate::render::uniforms::BatchUniform;
use crate::resources::geometry::{self, Geometry};
use crate::resources::material::AlphaMode;
use crate::utils::math::align_to;

const GBUFFER_WGSL: &str = include_str!("../../shaders/gbuffer.wgsl");

/// Initial capacity of the per-draw uniform array.
const INITIAL_DRAW_CAPACITY: u32 = 256;

struct GBufferDraw {
    geometry: Arc<Geometry>,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    bind_group: wgpu::BindGroup,
    dynamic_offset: u32,
    double_sided: bool,
}

pub struct GBufferPass {
    pipeline: wgpu::RenderPipeline,
    pipeline_double_sided: wgpu::RenderPipeline,
    global_layout: wgpu::BindGroupLayout,
    batch_layout: wgpu::BindGroupLayout,
    global_bind_group: Option<wgpu::BindGroup>,

    batch_uniforms: GpuBuffer,
    batch_stride: u32,
    batch_capacity: u32,

    draws: Vec<GBufferDraw>,
}

impl GBufferPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GBuffer Global Layout"),
            entries: &[
                // Camera
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Noise
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let batch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GBuffer Batch Layout"),
            entries: &[
                // Batch params (dynamic offset)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<BatchUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                texture(1), // albedo
                texture(2), // normal map
                texture(3), // arm
                texture(4), // emissive
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Joint matrices, current + previous frame
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let batch_stride = align_to(
            std::mem::size_of::<BatchUniform>() as u32,
            device.limits().min_uniform_buffer_offset_alignment.max(1),
        );
        let batch_uniforms = GpuBuffer::new(
            device,
            "GBuffer Batch Uniforms",
            u64::from(batch_stride) * u64::from(INITIAL_DRAW_CAPACITY),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        let make_pipeline = |double_sided: bool| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("GBuffer Shader"),
                source: wgpu::ShaderSource::Wgsl(GBUFFER_WGSL.into()),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("GBuffer Pipeline Layout"),
                bind_group_layouts: &[Some(&global_layout), Some(&batch_layout)],
                immediate_size: 0,
            });
            let targets = [
                Some(ALBEDO_FORMAT.into()),
                Some(NORMAL_FORMAT.into()),
                Some(ARM_FORMAT.into()),
                Some(EMISSION_FORMAT.into()),
                Some(VELOCITY_FORMAT.into()),
            ];
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("GBuffer Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[geometry::vertex_layout(), geometry::instance_layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState {
                    cull_mode: if double_sided {
                        None
                    } else {
                        Some(wgpu::Face::Back)
                    },
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: Some(true),
                    depth_compare: Some(wgpu::CompareFunction::LessEqual),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        Self {
            pipeline: make_pipeline(false),
            pipeline_double_sided: make_pipeline(true),
            global_layout,
            batch_layout,
            global_bind_group: None,
            batch_uniforms,
            batch_stride,
            batch_capacity: INITIAL_DRAW_CAPACITY,
            draws: Vec::new(),
        }
    }

    fn ensure_batch_capacity(&mut self, device: &wgpu::Device, required: u32) {
        if required <= self.batch_capacity {
            return;
        }
        let mut capacity = self.batch_capacity.max(1);
        while capacity < required {
            capacity = capacity.saturating_mul(2);
        }
        self.batch_uniforms.destroy();
        self.batch_uniforms = GpuBuffer::new(
            device,
            "GBuffer Batch Uniforms",
            u64::from(self.batch_stride) * u64::from(capacity),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        self.batch_capacity = capacity;
    }

    /// Packs the per-draw uniform for a batch primitive.
    fn batch_uniform(batch: &RenderBatch, primitive: usize, skinned: bool) -> BatchUniform {
        let material = &batch.primitives[primitive].material;
        BatchUniform {
            flags: [
                batch.billboard.as_u32(),
                u32::from(skinned),
                match material.alpha_mode {
                    AlphaMode::Opaque => 0,
                    AlphaMode::Hash => 1,
                },
                u32::from(material.luminance_alpha),
            ],
            surface: glam::Vec4::new(
                material.opacity,
                material.specular_boost,
                1.0,
                f32::from(u8::from(material.double_sided)),
            ),
            emissive: material.emissive_factor.extend(0.0),
            ..BatchUniform::default()
        }
    }
}

impl RenderNode for GBufferPass {
    fn name(&self) -> &'static str {
        "GBuffer Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let device = &ctx.gpu.device;

        self.global_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GBuffer Global BindGroup"),
            layout: &self.global_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.registry.noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&ctx.registry.samplers.linear_repeat),
                },
            ],
        }));

        // One uniform slot + bind group per (batch, primitive).
        let draw_count: u32 = ctx
            .batches
            .iter()
            .map(|b| b.primitives.len() as u32)
            .sum();
        self.ensure_batch_capacity(device, draw_count.max(1));

        self.draws.clear();
        let mut uniform_data = vec![0u8; (self.batch_stride as usize) * draw_count.max(1) as usize];
        let mut slot = 0u32;

        for batch in ctx.batches {
            let (joints, prev_joints) = match &batch.skin_key {
                Some(key) => (
                    ctx.skins.texture_view(key),
                    ctx.skins.prev_texture_view(key),
                ),
                None => (None, None),
            };
            let skinned = joints.is_some();
            let joints = joints.unwrap_or(&ctx.registry.identity_joints.view);
            let prev_joints = prev_joints.unwrap_or(&ctx.registry.identity_joints.view);

            for (index, primitive) in batch.primitives.iter().enumerate() {
                let offset = slot * self.batch_stride;
                let uniform = Self::batch_uniform(batch, index, skinned);
                uniform_data[offset as usize..offset as usize + std::mem::size_of::<BatchUniform>()]
                    .copy_from_slice(bytemuck::bytes_of(&uniform));

                let material = &primitive.material;
                let albedo = material
                    .albedo
                    .as_ref()
                    .map_or(&ctx.registry.white.view, |t| &t.view);
                let normal = material
                    .normal
                    .as_ref()
                    .map_or(&ctx.registry.flat_normal.view, |t| &t.view);
                let arm = material
                    .arm
                    .as_ref()
                    .map_or(&ctx.registry.white.view, |t| &t.view);
                let emissive = material
                    .emissive
                    .as_ref()
                    .map_or(&ctx.registry.white.view, |t| &t.view);

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("GBuffer Batch BindGroup"),
                    layout: &self.batch_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &self.batch_uniforms.buffer,
                                offset: 0,
                                size: wgpu::BufferSize::new(
                                    std::mem::size_of::<BatchUniform>() as u64
                                ),
                            }),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(albedo),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(normal),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(arm),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::TextureView(emissive),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: wgpu::BindingResource::Sampler(
                                &ctx.registry.samplers.linear_repeat,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 6,
                            resource: wgpu::BindingResource::TextureView(joints),
                        },
                        wgpu::BindGroupEntry {
                            binding: 7,
                            resource: wgpu::BindingResource::TextureView(prev_joints),
                        },
                    ],
                });

                self.draws.push(GBufferDraw {
                    geometry: primitive.geometry.clone(),
                    instance_buffer: batch.instance_buffer.clone(),
                    instance_count: batch.instance_count,
                    bind_group,
                    dynamic_offset: offset,
                    double_sided: material.double_sided,
                });
                slot += 1;
            }
        }

        if slot > 0 {
            ctx.gpu
                .queue
                .write_buffer(&self.batch_uniforms.buffer, 0, &uniform_data);
        }
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let gb = &ctx.targets.screen.gbuffer;
        let color_attachment = |view, r, g, b, a| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GBuffer Pass"),
            color_attachments: &[
                color_attachment(&gb.albedo.view, 0.0, 0.0, 0.0, 0.0),
                color_attachment(&gb.normal.view, 0.0, 0.0, 0.0, 0.0),
                color_attachment(&gb.arm.view, 1.0, 1.0, 0.0, 0.0),
                color_attachment(&gb.emission.view, 0.0, 0.0, 0.0, 0.0),
                color_attachment(&gb.velocity.view, 0.0, 0.0, 0.0, 0.0),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.depth().view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        let Some(global) = &self.global_bind_group else {
            return;
        };

        for draw in &self.draws {
            pass.set_pipeline(if draw.double_sided {
                &self.pipeline_double_sided
            } else {
                &self.pipeline
            });
            pass.set_bind_group(0, global, &[]);
            pass.set_bind_group(1, &draw.bind_group, &[draw.dynamic_offset]);
            pass.set_vertex_buffer(0, draw.geometry.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, draw.instance_buffer.slice(..));
            pass.set_index_buffer(draw.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.geometry.index_count, 0, 0..draw.instance_count);
        }
    }
}
