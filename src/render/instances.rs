//! Instance manager: per-model instance arrays and the GPU buffer pool.
//!
//! Buffers are pooled by rounded capacity and live for exactly one batch
//! generation: `begin_frame` returns the previous frame's buffers to the
//! pool before new ones are handed out. Releasing through the pool is the
//! only path that frees instance buffers; `teardown` destroys every pooled
//! handle.

use std::sync::Arc;

use glam::Vec4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::assets::{AssetCache, MeshAsset};
use crate::render::culling::{CullResults, SkinKey, VisibleEntry};
use crate::resources::geometry::{pack_instance, INSTANCE_FLOATS, INSTANCE_STRIDE};
use crate::scene::BillboardMode;

/// Smallest pooled capacity, in instances.
pub const MIN_POOL_CAPACITY: u32 = 1000;

/// Pool key for a requested instance count: the next power of two, with a
/// floor of [`MIN_POOL_CAPACITY`].
#[must_use]
pub fn round_capacity(count: u32) -> u32 {
    count.max(1).next_power_of_two().max(MIN_POOL_CAPACITY)
}

/// A ready-to-draw group: shared geometry, one packed instance buffer.
pub struct RenderBatch {
    pub model: String,
    /// Every primitive of the model draws with the same instance buffer.
    pub primitives: SmallVec<[Arc<MeshAsset>; 2]>,
    pub instance_buffer: wgpu::Buffer,
    pub instance_count: u32,
    pub has_skin: bool,
    pub skin_key: Option<SkinKey>,
    pub billboard: BillboardMode,
}

#[derive(Default)]
pub struct InstanceManager {
    /// capacity -> free buffers of exactly that capacity.
    pool: FxHashMap<u32, Vec<wgpu::Buffer>>,
    /// Buffers handed out since the last `begin_frame`.
    live: Vec<(u32, wgpu::Buffer)>,
    scratch: Vec<f32>,
}

impl InstanceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all live buffers to the pool. Called once per frame before
    /// any batch building; previous batches must be dropped by then.
    pub fn begin_frame(&mut self) {
        for (capacity, buffer) in self.live.drain(..) {
            self.pool.entry(capacity).or_default().push(buffer);
        }
    }

    fn acquire(&mut self, device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        let buffer = self
            .pool
            .get_mut(&capacity)
            .and_then(Vec::pop)
            .unwrap_or_else(|| {
                log::debug!("Instance pool: new buffer for capacity {capacity}");
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Instance Buffer"),
                    size: u64::from(capacity) * INSTANCE_STRIDE,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });
        self.live.push((capacity, buffer.clone()));
        buffer
    }

    /// Packs `entries` into a pooled buffer and uploads exactly
    /// `entries.len() × 112` bytes.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        entries: &[VisibleEntry],
    ) -> (wgpu::Buffer, u32) {
        let count = entries.len() as u32;
        let buffer = self.acquire(device, round_capacity(count));

        self.scratch.clear();
        self.scratch.reserve(entries.len() * INSTANCE_FLOATS);
        for entry in entries {
            // A negative radius tells the vertex shader this instance is a
            // world-placed static mesh: pixel rounding does not apply.
            let mut sphere = entry.sphere;
            if entry.is_static {
                sphere.w = -sphere.w.abs();
            }
            pack_instance(
                &mut self.scratch,
                &entry.world,
                sphere,
                entry.uv_transform,
                entry.color,
            );
        }
        if !self.scratch.is_empty() {
            queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&self.scratch));
        }
        (buffer, count)
    }

    /// Builds draw batches for a culling result. Groups whose asset is not
    /// ready produce nothing.
    pub fn build_batches(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        results: &CullResults,
        assets: &AssetCache,
    ) -> Vec<RenderBatch> {
        let mut batches = Vec::with_capacity(results.groups.len());
        // Deterministic batch order across frames.
        let mut keys: Vec<_> = results.groups.keys().collect();
        keys.sort_unstable_by(|a, b| {
            (&a.model, skin_sort_key(&a.skin)).cmp(&(&b.model, skin_sort_key(&b.skin)))
        });

        for key in keys {
            let entries = &results.groups[key];
            let Some(asset) = assets.get(&key.model) else {
                continue;
            };
            if asset.primitives.is_empty() || entries.is_empty() {
                continue;
            }
            let (instance_buffer, instance_count) = self.upload(device, queue, entries);
            batches.push(RenderBatch {
                model: key.model.clone(),
                primitives: asset.primitives.iter().cloned().collect(),
                instance_buffer,
                instance_count,
                has_skin: asset.has_skin,
                skin_key: key.skin.clone(),
                billboard: entries[0].billboard,
            });
        }
        batches
    }

    /// Live + pooled buffer count, for stats and tests.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.pool.values().map(Vec::len).sum::<usize>() + self.live.len()
    }

    /// Destroys every pooled GPU handle. Only valid at engine teardown.
    pub fn teardown(&mut self) {
        for (_, buffer) in self.live.drain(..) {
            buffer.destroy();
        }
        for (_, buffers) in self.pool.drain() {
            for buffer in buffers {
                buffer.destroy();
            }
        }
    }
}

/// Stable ordering helper for skin keys.
fn skin_sort_key(skin: &Option<SkinKey>) -> u64 {
    use std::hash::{Hash, Hasher};
    match skin {
        None => 0,
        Some(key) => {
            let mut hasher = rustc_hash::FxHasher::default();
            key.hash(&mut hasher);
            hasher.finish() | 1
        }
    }
}

/// Packs one raw instance, exposed for shadow-filtered uploads and tests.
#[must_use]
pub fn pack_entries(entries: &[VisibleEntry]) -> Vec<f32> {
    let mut out = Vec::with_capacity(entries.len() * INSTANCE_FLOATS);
    for entry in entries {
        let mut sphere = entry.sphere;
        if entry.is_static {
            sphere.w = -sphere.w.abs();
        }
        pack_instance(&mut out, &entry.world, sphere, entry.uv_transform, entry.color);
    }
    out
}

/// Sphere-vs-sphere helper shared with the shadow cascade filter.
#[must_use]
pub fn spheres_intersect(a: Vec4, b: Vec4) -> bool {
    let center_a = a.truncate();
    let center_b = b.truncate();
    let r = a.w.abs() + b.w.abs();
    center_a.distance_squared(center_b) <= r * r
}
