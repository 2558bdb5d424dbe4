//! HiZ reducer: per-tile min/max depth from the previous frame.
//!
//! A compute shader reduces 64×64 pixel tiles of the previous frame's
//! linear depth into (min, max) pairs. The result is copied to a staging
//! buffer and mapped asynchronously; culling consumes the latest completed
//! snapshot on a following frame, so the data is always one or two frames
//! old and treated accordingly (warmup on camera jumps).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::GpuBuffer;
use crate::render::culling::HiZSnapshot;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{depth_texture_entry, storage_entry, uniform_entry};

const HIZ_WGSL: &str = include_str!("../../shaders/hiz.wgsl");

pub struct HiZPass {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,
    bind_group: Option<wgpu::BindGroup>,

    staging: wgpu::Buffer,
    staging_capacity: u64,
    readback_in_flight: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<HiZSnapshot>>>,
    tiles: (u32, u32),
}

impl HiZPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HiZ Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                depth_texture_entry(1),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
            ],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("HiZ Shader"),
            source: wgpu::ShaderSource::Wgsl(HIZ_WGSL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("HiZ Pipeline Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("HiZ Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("cs_reduce"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let staging_capacity = 8 * 1024;
        Self {
            pipeline,
            layout,
            uniform: GpuBuffer::new_uniform(device, "HiZ Uniform", 16),
            bind_group: None,
            staging: Self::make_staging(device, staging_capacity),
            staging_capacity,
            readback_in_flight: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(Mutex::new(None)),
            tiles: (0, 0),
        }
    }

    fn make_staging(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("HiZ Staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }

    /// Latest completed snapshot, if any. Leaves it available for reuse.
    #[must_use]
    pub fn snapshot(&self) -> Option<HiZSnapshot> {
        self.latest.lock().clone()
    }

    /// Drops the snapshot, forcing culling back to frustum-only until the
    /// next readback completes.
    pub fn invalidate(&self) {
        *self.latest.lock() = None;
    }

    /// Kicks the asynchronous map of this frame's staging copy. Called by
    /// the graph after submit; skipped while a previous map is pending.
    pub fn request_readback(&self) {
        if self
            .readback_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let buffer = self.staging.clone();
        let latest = self.latest.clone();
        let in_flight = self.readback_in_flight.clone();
        let (tiles_x, tiles_y) = self.tiles;
        let byte_len = u64::from(tiles_x * tiles_y) * 8;

        self.staging
            .slice(..byte_len.max(8))
            .map_async(wgpu::MapMode::Read, move |result| {
                if result.is_ok() {
                    let data: Vec<f32> = {
                        let view = buffer.slice(..byte_len.max(8)).get_mapped_range();
                        bytemuck::cast_slice(&view).to_vec()
                    };
                    *latest.lock() = Some(HiZSnapshot {
                        tiles_x,
                        tiles_y,
                        data,
                    });
                }
                buffer.unmap();
                in_flight.store(false, Ordering::Release);
            });
    }
}

impl RenderNode for HiZPass {
    fn name(&self) -> &'static str {
        "HiZ Reduce Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        let device = &ctx.gpu.device;
        let screen = &ctx.targets.screen;
        self.tiles = (screen.hiz_tiles_x, screen.hiz_tiles_y);

        let needed = u64::from(screen.hiz_tiles_x * screen.hiz_tiles_y) * 8;
        if needed > self.staging_capacity && !self.readback_in_flight.load(Ordering::Acquire) {
            self.staging.destroy();
            self.staging_capacity = needed.next_power_of_two();
            self.staging = Self::make_staging(device, self.staging_capacity);
        }

        self.uniform.write(
            &ctx.gpu.queue,
            &[screen.width, screen.height, screen.hiz_tiles_x, screen.hiz_tiles_y],
        );

        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("HiZ BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.prev_depth().view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: ctx.targets.screen.hiz_buffer.as_entire_binding(),
                },
            ],
        }));
    }

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("HiZ Reduce"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(self.tiles.0, self.tiles.1, 1);
        }

        if !self.readback_in_flight.load(Ordering::Acquire) {
            let byte_len = u64::from(self.tiles.0 * self.tiles.1) * 8;
            if byte_len <= self.staging_capacity {
                encoder.copy_buffer_to_buffer(
                    &ctx.targets.screen.hiz_buffer.buffer,
                    0,
                    &self.staging,
                    0,
                    byte_len,
                );
            }
        }
    }
}
