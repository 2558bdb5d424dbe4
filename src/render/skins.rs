//! Per-frame skin animator bank.
//!
//! Maps each [`SkinKey`] produced by culling to a [`SkinAnimator`] owning
//! its joint texture pair. Individually budgeted entities get an animator
//! keyed by entity id driven by that entity's playback state; shared
//! buckets get one animator per `(model, clip, phase)` whose time is offset
//! by the bucket phase. Animators unused for a while are pruned.

use rustc_hash::FxHashMap;

use crate::assets::AssetCache;
use crate::render::culling::SkinKey;
use crate::resources::skin::SkinAnimator;
use crate::scene::EntityStore;

/// Frames an animator may go unreferenced before it is dropped.
const PRUNE_AFTER_FRAMES: u64 = 120;

struct BankEntry {
    animator: SkinAnimator,
    last_used: u64,
}

#[derive(Default)]
pub struct SkinBank {
    entries: FxHashMap<SkinKey, BankEntry>,
}

impl SkinBank {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures an animator exists and is up to date for every skin key in
    /// `keys`, advancing playback by `dt` and uploading joint textures.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assets: &AssetCache,
        entities: &EntityStore,
        keys: impl Iterator<Item = SkinKey>,
        dt: f32,
        frame_index: u64,
        phase_buckets: u32,
    ) {
        for key in keys {
            let model = match &key {
                SkinKey::Individual(id) => {
                    let Some(entity) = entities.get(*id) else {
                        continue;
                    };
                    let Some(model) = entity.model.clone() else {
                        continue;
                    };
                    model
                }
                SkinKey::Shared { model, .. } => model.clone(),
            };
            let Some(asset) = assets.get(&model) else {
                continue;
            };
            let Some(skin) = asset
                .primitives
                .iter()
                .find_map(|p| p.skin.clone())
            else {
                continue;
            };

            let entry = self.entries.entry(key.clone()).or_insert_with(|| BankEntry {
                animator: SkinAnimator::new(device, skin),
                last_used: frame_index,
            });
            entry.last_used = frame_index;

            match &key {
                SkinKey::Individual(id) => {
                    if let Some(state) = entities.get(*id).and_then(|e| e.animation.clone()) {
                        entry.animator.speed = state.speed;
                        if entry.animator.clip.as_deref() != Some(state.clip.as_str()) {
                            entry.animator.crossfade(&state.clip, 0.25);
                        }
                    }
                }
                SkinKey::Shared { clip, bucket, .. } => {
                    if entry.animator.clip.is_none() && !clip.is_empty() {
                        entry.animator.play(clip);
                        // Spread bucket phases across the clip duration.
                        if let Some(duration) = entry
                            .animator
                            .skin
                            .clip(clip)
                            .map(|c| c.duration)
                        {
                            entry.animator.time =
                                duration * (*bucket as f32 / phase_buckets.max(1) as f32);
                        }
                    }
                }
            }

            entry.animator.update(dt);
            entry.animator.upload(queue);
        }

        self.entries
            .retain(|_, entry| frame_index.saturating_sub(entry.last_used) < PRUNE_AFTER_FRAMES);
    }

    /// Joint texture view for a batch, if its animator exists.
    #[must_use]
    pub fn texture_view(&self, key: &SkinKey) -> Option<&wgpu::TextureView> {
        self.entries.get(key).map(|e| &e.animator.texture().view)
    }

    /// Previous-frame joint texture view.
    #[must_use]
    pub fn prev_texture_view(&self, key: &SkinKey) -> Option<&wgpu::TextureView> {
        self.entries
            .get(key)
            .map(|e| &e.animator.prev_texture().view)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
