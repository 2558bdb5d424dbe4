//! Planar reflection: the scene rendered mirrored below a world-Y plane.
//!
//! A simplified forward shader draws every main-view batch with the camera
//! mirrored about the plane and a clip plane discarding geometry below it.
//! The lighting pass composites the result onto upward-facing surfaces
//! with a height fade.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::gpu::{GpuBuffer, DEPTH_FORMAT, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::uniforms::CameraUniform;
use crate::resources::geometry::{self, Geometry};
use crate::utils::math::align_to;

const PLANAR_WGSL: &str = include_str!("../../shaders/planar.wgsl");

struct PlanarDraw {
    geometry: Arc<Geometry>,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    bind_group: wgpu::BindGroup,
    dynamic_offset: u32,
}

pub struct PlanarReflectionPass {
    pipeline: wgpu::RenderPipeline,
    global_layout: wgpu::BindGroupLayout,
    batch_layout: wgpu::BindGroupLayout,
    camera_buffer: GpuBuffer,
    batch_uniforms: GpuBuffer,
    batch_stride: u32,
    batch_capacity: u32,
    global_bind_group: Option<wgpu::BindGroup>,
    draws: Vec<PlanarDraw>,
    enabled: bool,
}

impl PlanarReflectionPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Planar Global Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let batch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Planar Batch Layout"),
            entries: &[
                // (skinned, 0, 0, 0)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(16),
                    },
                    count: None,
                },
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
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
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

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Planar Shader"),
            source: wgpu::ShaderSource::Wgsl(PLANAR_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Planar Pipeline Layout"),
            bind_group_layouts: &[Some(&global_layout), Some(&batch_layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Planar Pipeline"),
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
                targets: &[Some(HDR_FORMAT.into())],
            }),
            primitive: wgpu::PrimitiveState {
                // Mirroring flips the winding; skip culling entirely.
                cull_mode: None,
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
        });

        let batch_stride = align_to(16, device.limits().min_uniform_buffer_offset_alignment.max(1));
        Self {
            pipeline,
            global_layout,
            batch_layout,
            camera_buffer: GpuBuffer::new_uniform(
                device,
                "Planar Camera",
                std::mem::size_of::<CameraUniform>() as u64,
            ),
            batch_uniforms: GpuBuffer::new_uniform(device, "Planar Batch Uniforms", u64::from(batch_stride) * 256),
            batch_stride,
            batch_capacity: 256,
            global_bind_group: None,
            draws: Vec::new(),
            enabled: false,
        }
    }

    /// Reflection matrix about the world plane `y = plane_y`.
    #[must_use]
    pub fn mirror_matrix(plane_y: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, plane_y, 0.0))
            * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::from_translation(Vec3::new(0.0, -plane_y, 0.0))
    }
}

impl RenderNode for PlanarReflectionPass {
    fn name(&self) -> &'static str {
        "Planar Reflection Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.enabled = ctx.settings.planar_reflection.enabled;
        if !self.enabled {
            return;
        }
        let device = &ctx.gpu.device;
        let plane_y = ctx.settings.planar_reflection.plane_y;

        // Mirrored camera: same projection, view premultiplied by the
        // reflection, clip plane keeping the half-space above the mirror.
        let mirror = Self::mirror_matrix(plane_y);
        let mut uniform = CameraUniform::build(
            ctx.camera,
            ctx.settings,
            ctx.targets.screen.width / 2,
            ctx.targets.screen.height / 2,
            ctx.frame_index,
            ctx.time,
        )
        .with_clip_plane(plane_y, 1.0);
        uniform.view = ctx.camera.view_matrix * mirror;
        uniform.view_proj = ctx.camera.projection_matrix * uniform.view;
        self.camera_buffer.write(&ctx.gpu.queue, &[uniform]);

        self.global_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Planar Global BindGroup"),
            layout: &self.global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: self.camera_buffer.as_entire_binding(),
            }],
        }));

        // Per-draw uniforms + bind groups.
        let draw_count: u32 = ctx.batches.iter().map(|b| b.primitives.len() as u32).sum();
        if draw_count > self.batch_capacity {
            let mut capacity = self.batch_capacity;
            while capacity < draw_count {
                capacity *= 2;
            }
            self.batch_uniforms.destroy();
            self.batch_uniforms = GpuBuffer::new_uniform(
                device,
                "Planar Batch Uniforms",
                u64::from(self.batch_stride) * u64::from(capacity),
            );
            self.batch_capacity = capacity;
        }

        self.draws.clear();
        let mut data = vec![0u8; (self.batch_stride * draw_count.max(1)) as usize];
        let mut slot = 0u32;
        for batch in ctx.batches {
            let joints = batch
                .skin_key
                .as_ref()
                .and_then(|k| ctx.skins.texture_view(k));
            let skinned = joints.is_some();
            let joints = joints.unwrap_or(&ctx.registry.identity_joints.view);

            for primitive in &batch.primitives {
                let offset = slot * self.batch_stride;
                let flags: [u32; 4] = [u32::from(skinned), 0, 0, 0];
                data[offset as usize..offset as usize + 16]
                    .copy_from_slice(bytemuck::bytes_of(&flags));

                let albedo = primitive
                    .material
                    .albedo
                    .as_ref()
                    .map_or(&ctx.registry.white.view, |t| &t.view);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Planar Batch BindGroup"),
                    layout: &self.batch_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &self.batch_uniforms.buffer,
                                offset: 0,
                                size: wgpu::BufferSize::new(16),
                            }),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(albedo),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(
                                &ctx.registry.samplers.linear_repeat,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(joints),
                        },
                    ],
                });
                self.draws.push(PlanarDraw {
                    geometry: primitive.geometry.clone(),
                    instance_buffer: batch.instance_buffer.clone(),
                    instance_count: batch.instance_count,
                    bind_group,
                    dynamic_offset: offset,
                });
                slot += 1;
            }
        }
        if slot > 0 {
            ctx.gpu
                .queue
                .write_buffer(&self.batch_uniforms.buffer, 0, &data);
        }
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        if !self.enabled {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Planar Reflection"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.screen.planar_color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.screen.planar_depth.view,
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
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, global, &[]);
        for draw in &self.draws {
            pass.set_bind_group(1, &draw.bind_group, &[draw.dynamic_offset]);
            pass.set_vertex_buffer(0, draw.geometry.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, draw.instance_buffer.slice(..));
            pass.set_index_buffer(draw.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.geometry.index_count, 0, 0..draw.instance_count);
        }
    }
}
