//! Shadow pass: cascaded directional shadows + the spot shadow atlas.
//!
//! Each cascade is a square orthographic projection facing the main light,
//! centered on the camera's XZ position with a configured half-width. Spot
//! lights compete for 16 atlas slots in a 4×4 grid under an LRU policy
//! keyed by light identity, so slots persist across frames while a light
//! stays visible.
//!
//! Per frame the pass walks: collect filters → render cascades → render
//! spot slots → publish matrices. The cascade and spot matrix buffers are
//! written once and read by the lighting pass.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::assets::AssetCache;
use crate::gpu::{GpuBuffer, GpuContext, ResourceRegistry, DEPTH_FORMAT};
use crate::render::culling::CullResults;
use crate::render::instances::{spheres_intersect, InstanceManager};
use crate::render::lights::FrameLights;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::skins::SkinBank;
use crate::render::targets::{SharedTargets, MAX_CASCADES, MAX_SPOT_SHADOWS, SPOT_TILES_PER_ROW};
use crate::resources::geometry::{self, Geometry};
use crate::settings::Settings;
use crate::utils::math::align_to;

const SHADOW_WGSL: &str = include_str!("../../shaders/shadow.wgsl");

/// One depth-only draw.
struct ShadowDraw {
    geometry: Arc<Geometry>,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    joint_bind_group: wgpu::BindGroup,
}

struct SpotSlot {
    slot: u32,
    last_used: u64,
}

/// LRU map from light identity to one of the 16 atlas slots.
///
/// A slot assigned to a light persists while that light keeps qualifying;
/// new lights take free slots first and evict the least recently used
/// otherwise.
#[derive(Default)]
pub struct SpotSlotAllocator {
    slots: FxHashMap<u64, SpotSlot>,
    frame_counter: u64,
}

impl SpotSlotAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns atlas slots to this frame's eligible spot lights, writing
    /// `shadow_index` into their light records. Lights past the maximum
    /// shadow distance keep -1. Returns the assigned spot indices.
    pub fn assign(&mut self, lights: &mut FrameLights, settings: &Settings) -> Vec<usize> {
        self.frame_counter += 1;
        let max_slots = settings.shadow.max_spot_shadows.min(MAX_SPOT_SHADOWS);

        let mut eligible: Vec<usize> = (0..lights.spots.len())
            .filter(|&i| lights.spots[i].distance_to_camera <= settings.shadow.spot_max_distance)
            .collect();
        eligible.sort_unstable_by(|&a, &b| {
            lights.spots[a]
                .distance_to_camera
                .total_cmp(&lights.spots[b].distance_to_camera)
        });
        eligible.truncate(max_slots as usize);

        // Keep existing assignments when possible.
        let mut used_slots = [false; MAX_SPOT_SHADOWS as usize];
        let mut assigned: Vec<usize> = Vec::with_capacity(eligible.len());
        let mut pending: Vec<usize> = Vec::new();
        for &spot_index in &eligible {
            let key = lights.spots[spot_index].key;
            if let Some(slot) = self.slots.get_mut(&key) {
                if !used_slots[slot.slot as usize] {
                    slot.last_used = self.frame_counter;
                    used_slots[slot.slot as usize] = true;
                    assigned.push(spot_index);
                    continue;
                }
            }
            pending.push(spot_index);
        }

        for spot_index in pending {
            let key = lights.spots[spot_index].key;
            // Free slot first, else evict the least recently used entry
            // that is not in use this frame.
            let mut slot = (0..max_slots)
                .find(|&s| !used_slots[s as usize] && !self.slots.values().any(|v| v.slot == s));
            if slot.is_none() {
                let victim = self
                    .slots
                    .iter()
                    .filter(|(_, v)| !used_slots[v.slot as usize])
                    .min_by_key(|(_, v)| v.last_used)
                    .map(|(k, v)| (*k, v.slot));
                if let Some((old_key, old_slot)) = victim {
                    self.slots.remove(&old_key);
                    slot = Some(old_slot);
                }
            }
            let Some(slot) = slot else {
                continue;
            };
            used_slots[slot as usize] = true;
            self.slots.insert(
                key,
                SpotSlot {
                    slot,
                    last_used: self.frame_counter,
                },
            );
            assigned.push(spot_index);
        }

        for &spot_index in &assigned {
            let spot = &lights.spots[spot_index];
            let slot = self.slots[&spot.key].slot;
            lights.records[spot.record].shadow_index = slot as i32;
        }
        assigned
    }

    /// Slot currently held by a light, if any.
    #[must_use]
    pub fn slot_of(&self, key: u64) -> Option<u32> {
        self.slots.get(&key).map(|s| s.slot)
    }
}

pub struct ShadowPass {
    pipeline: wgpu::RenderPipeline,
    joint_layout: wgpu::BindGroupLayout,
    /// Per-view (cascade or spot slot) uniform, indexed by dynamic offset.
    view_buffer: GpuBuffer,
    view_stride: u32,
    view_bind_group: wgpu::BindGroup,

    cascade_draws: Vec<Vec<ShadowDraw>>,
    spot_draws: Vec<(u32, Vec<ShadowDraw>)>,
    slots: SpotSlotAllocator,
    /// Cascade matrices published this frame, for the lighting uniform.
    pub cascade_matrices: [Mat4; MAX_CASCADES as usize],
}

impl ShadowPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let view_stride = align_to(
            96,
            device.limits().min_uniform_buffer_offset_alignment.max(1),
        );
        let view_count = MAX_CASCADES + MAX_SPOT_SHADOWS;

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow View Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(96),
                },
                count: None,
            }],
        });

        let joint_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Joint Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let view_buffer = GpuBuffer::new(
            device,
            "Shadow View Uniforms",
            u64::from(view_stride) * u64::from(view_count),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );

        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow View BindGroup"),
            layout: &view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &view_buffer.buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(96),
                }),
            }],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[Some(&view_layout), Some(&joint_layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_shadow"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[geometry::vertex_layout(), geometry::instance_layout()],
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: Some(true),
                depth_compare: Some(wgpu::CompareFunction::LessEqual),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Self {
            pipeline,
            joint_layout,
            view_buffer,
            view_stride,
            view_bind_group,
            cascade_draws: Vec::new(),
            spot_draws: Vec::new(),
            slots: SpotSlotAllocator::new(),
            cascade_matrices: [Mat4::IDENTITY; MAX_CASCADES as usize],
        }
    }

    // ========================================================================
    // Cascade matrix construction
    // ========================================================================

    /// Square ortho facing `light_dir`, centered on the camera XZ, texel
    /// snapped to keep the shadow stable under camera motion.
    #[must_use]
    pub fn build_cascade_matrix(
        camera_position: Vec3,
        light_dir: Vec3,
        half_width: f32,
        map_size: u32,
    ) -> Mat4 {
        let dir = light_dir.normalize_or(Vec3::NEG_Y);
        let center = Vec3::new(camera_position.x, 0.0, camera_position.z);
        let up = if dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };

        let extent = half_width.max(1.0) * 4.0 + 200.0;
        let view = Mat4::look_at_rh(center - dir * extent * 0.5, center, up);

        // Texel snap on the light-space origin.
        let texel = (half_width * 2.0) / map_size.max(1) as f32;
        let mut origin = view.transform_point3(Vec3::ZERO);
        origin.x = (origin.x / texel).floor() * texel;
        origin.y = (origin.y / texel).floor() * texel;
        let snapped = view.transform_point3(Vec3::ZERO) - origin;
        let snap = Mat4::from_translation(Vec3::new(-snapped.x, -snapped.y, 0.0));

        let proj = Mat4::orthographic_rh(
            -half_width,
            half_width,
            -half_width,
            half_width,
            0.0,
            extent,
        );
        proj * snap * view
    }

    /// Spot view-projection from position, direction and outer cone cosine.
    #[must_use]
    pub fn build_spot_matrix(position: Vec3, direction: Vec3, outer_cone_cos: f32, range: f32) -> Mat4 {
        let dir = direction.normalize_or(Vec3::NEG_Y);
        let up = if dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
        let view = Mat4::look_at_rh(position, position + dir, up);
        let fov = (2.0 * outer_cone_cos.clamp(-1.0, 1.0).acos()).clamp(0.05, std::f32::consts::PI - 0.05);
        let proj = Mat4::perspective_rh(fov, 1.0, 0.05, range.max(1.0));
        proj * view
    }

    // ========================================================================
    // Frame build: filters, uploads, matrix publication
    // ========================================================================

    /// Builds all shadow draw lists for the frame and uploads the view and
    /// matrix buffers. Runs before the light buffer upload so the assigned
    /// spot slots land in the records.
    pub fn build_frame(
        &mut self,
        gpu: &GpuContext,
        targets: &SharedTargets,
        registry: &ResourceRegistry,
        settings: &Settings,
        shadow_cull: &CullResults,
        instances: &mut InstanceManager,
        lights: &mut FrameLights,
        skins: &SkinBank,
        assets: &AssetCache,
        camera_position: Vec3,
    ) {
        let device = &gpu.device;
        let queue = &gpu.queue;
        let light_dir = Vec3::from(settings.main_light.direction).normalize_or(Vec3::NEG_Y);
        let cascade_count = settings.shadow.cascade_count.clamp(1, MAX_CASCADES) as usize;

        // --- Cascade matrices + per-cascade filtered draws ---
        self.cascade_draws.clear();
        self.cascade_matrices = [Mat4::IDENTITY; MAX_CASCADES as usize];
        let mut view_data = vec![0u8; (self.view_stride as usize) * (MAX_CASCADES + MAX_SPOT_SHADOWS) as usize];

        for cascade in 0..cascade_count {
            let half_width = settings
                .shadow
                .cascade_sizes
                .get(cascade)
                .copied()
                .unwrap_or(50.0 * (cascade + 1) as f32);
            let matrix = Self::build_cascade_matrix(
                camera_position,
                light_dir,
                half_width,
                settings.shadow.map_size,
            );
            self.cascade_matrices[cascade] = matrix;

            let offset = cascade * self.view_stride as usize;
            write_view_uniform(&mut view_data[offset..], matrix, settings.shadow.surface_bias);

            // Filter: cascade coverage sphere vs instance sphere.
            let coverage = Vec4::new(
                camera_position.x,
                camera_position.y,
                camera_position.z,
                half_width * std::f32::consts::SQRT_2,
            );
            let mut draws = Vec::new();
            for (key, entries) in &shadow_cull.groups {
                let filtered: Vec<_> = entries
                    .iter()
                    .filter(|e| spheres_intersect(e.sphere, coverage))
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    continue;
                }
                self.push_draws(
                    device, queue, registry, skins, instances, assets, key, &filtered, &mut draws,
                );
            }
            self.cascade_draws.push(draws);
        }

        // --- Spot slots ---
        let assigned = self.slots.assign(lights, settings);
        self.spot_draws.clear();
        let mut spot_matrix_data = [Mat4::IDENTITY; MAX_SPOT_SHADOWS as usize];
        for spot_index in assigned {
            let spot = &lights.spots[spot_index];
            let Some(slot) = self.slots.slot_of(spot.key) else {
                continue;
            };
            let matrix =
                Self::build_spot_matrix(spot.position, spot.direction, spot.outer_cone, spot.radius);
            spot_matrix_data[slot as usize] = matrix;

            let offset = ((MAX_CASCADES + slot) * self.view_stride) as usize;
            write_view_uniform(&mut view_data[offset..], matrix, settings.shadow.surface_bias);

            let coverage = spot.position.extend(spot.radius);
            let mut draws = Vec::new();
            for (key, entries) in &shadow_cull.groups {
                let filtered: Vec<_> = entries
                    .iter()
                    .filter(|e| spheres_intersect(e.sphere, coverage))
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    continue;
                }
                self.push_draws(
                    device, queue, registry, skins, instances, assets, key, &filtered, &mut draws,
                );
            }
            self.spot_draws.push((slot, draws));
        }

        // --- Publish ---
        queue.write_buffer(&self.view_buffer.buffer, 0, &view_data);
        targets
            .cascade_matrices
            .write(queue, &self.cascade_matrices);
        targets.spot_matrices.write(queue, &spot_matrix_data);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_draws(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        registry: &ResourceRegistry,
        skins: &SkinBank,
        instances: &mut InstanceManager,
        assets: &AssetCache,
        key: &crate::render::culling::BatchKey,
        filtered: &[crate::render::culling::VisibleEntry],
        draws: &mut Vec<ShadowDraw>,
    ) {
        let Some(asset) = assets.get(&key.model) else {
            return;
        };
        let joint_view = key
            .skin
            .as_ref()
            .and_then(|k| skins.texture_view(k))
            .unwrap_or(&registry.identity_joints.view);
        let joint_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Joint BindGroup"),
            layout: &self.joint_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(joint_view),
            }],
        });

        let (instance_buffer, instance_count) = instances.upload(device, queue, filtered);
        for primitive in &asset.primitives {
            draws.push(ShadowDraw {
                geometry: primitive.geometry.clone(),
                instance_buffer: instance_buffer.clone(),
                instance_count,
                joint_bind_group: joint_bind_group.clone(),
            });
        }
    }

    /// Draw count across cascades, for stats and tests.
    #[must_use]
    pub fn cascade_draw_count(&self, cascade: usize) -> usize {
        self.cascade_draws.get(cascade).map_or(0, Vec::len)
    }
}

fn write_view_uniform(out: &mut [u8], matrix: Mat4, surface_bias: f32) {
    out[..64].copy_from_slice(bytemuck::bytes_of(&matrix));
    let params = Vec4::new(surface_bias, 0.0, 0.0, 0.0);
    out[64..80].copy_from_slice(bytemuck::bytes_of(&params));
}

impl RenderNode for ShadowPass {
    fn name(&self) -> &'static str {
        "Shadow Pass"
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        // Cascades: one depth-only pass per array layer.
        for (cascade, draws) in self.cascade_draws.iter().enumerate() {
            let layer_view = ctx.targets.cascade_map.layer_view(cascade as u32);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cascade Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &layer_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            let dynamic_offset = cascade as u32 * self.view_stride;
            pass.set_bind_group(0, &self.view_bind_group, &[dynamic_offset]);
            for draw in draws {
                pass.set_bind_group(1, &draw.joint_bind_group, &[]);
                pass.set_vertex_buffer(0, draw.geometry.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, draw.instance_buffer.slice(..));
                pass.set_index_buffer(draw.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.geometry.index_count, 0, 0..draw.instance_count);
            }
        }

        // Spot atlas: a single pass, one viewport per slot.
        let tile = ctx.settings.shadow.spot_tile_size.min(
            ctx.targets.spot_atlas.width / SPOT_TILES_PER_ROW,
        ) as f32;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Spot Shadow Atlas Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.spot_atlas.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        for (slot, draws) in &self.spot_draws {
            let x = (slot % SPOT_TILES_PER_ROW) as f32 * tile;
            let y = (slot / SPOT_TILES_PER_ROW) as f32 * tile;
            pass.set_viewport(x, y, tile, tile, 0.0, 1.0);
            pass.set_scissor_rect(x as u32, y as u32, tile as u32, tile as u32);
            let dynamic_offset = (MAX_CASCADES + slot) * self.view_stride;
            pass.set_bind_group(0, &self.view_bind_group, &[dynamic_offset]);
            for draw in draws {
                pass.set_bind_group(1, &draw.joint_bind_group, &[]);
                pass.set_vertex_buffer(0, draw.geometry.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, draw.instance_buffer.slice(..));
                pass.set_index_buffer(draw.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.geometry.index_count, 0, 0..draw.instance_count);
            }
        }
    }
}
