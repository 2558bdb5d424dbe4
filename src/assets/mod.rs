//! Asset cache: lazily loaded models keyed by `path` and `path|mesh`.
//!
//! Model decoding (glTF parsing, image decoding) is an external
//! collaborator; the cache only sees decoded [`ModelData`] through the
//! [`MeshSource`] contract. Loading is cooperative: the first `request` for
//! a path tells the host to start a load, every later request while that
//! load is in flight joins the same pending entry, and `complete` resolves
//! everything at once, firing any registered ready callbacks.

use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::resources::geometry::{BoundingSphere, Geometry, MeshData};
use crate::resources::material::{AlphaMode, Material, TextureData};
use crate::resources::skin::{AnimationClip, JointNode, Skin};

/// Cache key: `"path"` for a whole model, `"path|mesh"` for one primitive.
pub type AssetKey = String;

/// Splits a key into its path and optional mesh name.
#[must_use]
pub fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once('|') {
        Some((path, mesh)) => (path, Some(mesh)),
        None => (key, None),
    }
}

// ============================================================================
// Decoded model data (the MeshSource contract)
// ============================================================================

/// Decoded skin data for one primitive.
pub struct SkinData {
    pub joints: Vec<JointNode>,
    pub inverse_bind: Vec<Mat4>,
    pub animations: FxHashMap<String, AnimationClip>,
}

/// Decoded material parameters.
#[derive(Default)]
pub struct MaterialParams {
    pub albedo: Option<TextureData>,
    pub normal: Option<TextureData>,
    pub arm: Option<TextureData>,
    pub emissive: Option<TextureData>,
    pub alpha_mode: AlphaMode,
    pub opacity: f32,
    pub double_sided: bool,
    pub emissive_factor: [f32; 3],
    pub specular_boost: f32,
    pub luminance_alpha: bool,
}

/// One decoded primitive.
pub struct PrimitiveData {
    pub name: Option<String>,
    pub mesh: MeshData,
    pub material: MaterialParams,
    pub skin: Option<SkinData>,
}

/// A fully decoded model, ready for GPU upload.
#[derive(Default)]
pub struct ModelData {
    pub primitives: Vec<PrimitiveData>,
}

/// External decoder contract. Implementations parse and decode model files
/// however they like; the engine only consumes the decoded arrays.
pub trait MeshSource {
    fn load_model(&mut self, path: &str) -> Result<ModelData>;
}

// ============================================================================
// GPU-ready assets
// ============================================================================

/// One uploadable primitive.
pub struct MeshAsset {
    pub name: Option<String>,
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    pub skin: Option<Arc<Skin>>,
    /// Culling sphere. When any sibling primitive is skinned this is the
    /// union over all primitives, so rigid parts attached to an animated
    /// model share its culling fate.
    pub bounding_sphere: BoundingSphere,
}

/// A loaded model: every primitive plus the combined bounds.
pub struct ModelAsset {
    pub primitives: Vec<Arc<MeshAsset>>,
    pub bounding_sphere: BoundingSphere,
    pub has_skin: bool,
}

/// Load state visible to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Unloaded,
    Pending,
    Ready,
    Failed,
}

/// Outcome of a `request` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
    /// The caller should start the actual load for this path.
    Start,
    /// A load for this path is already in flight.
    Joined,
    /// The asset is already resolved (ready or failed).
    Resolved,
}

enum Entry {
    Pending,
    Ready(Arc<ModelAsset>),
    Failed(String),
}

type ReadyCallback = Box<dyn FnOnce(&ModelAsset) + Send>;

#[derive(Default)]
struct Inner {
    entries: FxHashMap<AssetKey, Entry>,
    callbacks: FxHashMap<AssetKey, Vec<ReadyCallback>>,
}

/// The asset cache.
#[derive(Default)]
pub struct AssetCache {
    inner: Mutex<Inner>,
}

impl AssetCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `key`. Only the first caller for a given path
    /// receives [`LoadRequest::Start`]; concurrent requests join the
    /// pending entry.
    pub fn request(&self, key: &str) -> LoadRequest {
        let (path, _) = split_key(key);
        let mut inner = self.inner.lock();
        match inner.entries.get(path) {
            Some(Entry::Pending) => LoadRequest::Joined,
            Some(_) => LoadRequest::Resolved,
            None => {
                inner.entries.insert(path.to_string(), Entry::Pending);
                LoadRequest::Start
            }
        }
    }

    #[must_use]
    pub fn status(&self, key: &str) -> AssetStatus {
        let inner = self.inner.lock();
        match inner.entries.get(key).or_else(|| {
            let (path, _) = split_key(key);
            inner.entries.get(path)
        }) {
            None => AssetStatus::Unloaded,
            Some(Entry::Pending) => AssetStatus::Pending,
            Some(Entry::Ready(_)) => AssetStatus::Ready,
            Some(Entry::Failed(_)) => AssetStatus::Failed,
        }
    }

    /// Resolves `key` to a loaded model, `None` while pending or failed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ModelAsset>> {
        let inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(Entry::Ready(model)) => Some(model.clone()),
            _ => None,
        }
    }

    /// Error string of a failed load.
    #[must_use]
    pub fn error(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(Entry::Failed(message)) => Some(message.clone()),
            _ => None,
        }
    }

    /// Runs `callback` once `key` resolves successfully; immediately when it
    /// already has.
    pub fn on_ready(&self, key: &str, callback: ReadyCallback) {
        let ready = {
            let inner = self.inner.lock();
            match inner.entries.get(key) {
                Some(Entry::Ready(model)) => Some(model.clone()),
                _ => None,
            }
        };
        if let Some(model) = ready {
            callback(&model);
            return;
        }
        self.inner
            .lock()
            .callbacks
            .entry(key.to_string())
            .or_default()
            .push(callback);
    }

    /// Delivers the result of a load started through `request`.
    ///
    /// On success, an entry is created for the model path and one for each
    /// named primitive (`path|name`). A model with zero primitives is a
    /// valid, ready, empty asset. On failure every waiter sees the error.
    pub fn complete(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &str,
        result: Result<ModelData>,
    ) {
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                let message = err.to_string();
                log::warn!("Asset load failed for {path}: {message}");
                let mut inner = self.inner.lock();
                inner.entries.insert(path.to_string(), Entry::Failed(message));
                inner.callbacks.remove(path);
                return;
            }
        };

        let model = Arc::new(build_model(device, queue, path, &data));

        let mut resolved: Vec<(AssetKey, Arc<ModelAsset>)> =
            vec![(path.to_string(), model.clone())];
        for primitive in &model.primitives {
            if let Some(name) = &primitive.name {
                let single = Arc::new(ModelAsset {
                    primitives: vec![primitive.clone()],
                    bounding_sphere: primitive.bounding_sphere,
                    has_skin: primitive.skin.is_some(),
                });
                resolved.push((format!("{path}|{name}"), single));
            }
        }

        let mut fired = Vec::new();
        {
            let mut inner = self.inner.lock();
            for (key, asset) in resolved {
                if let Some(callbacks) = inner.callbacks.remove(&key) {
                    fired.push((asset.clone(), callbacks));
                }
                inner.entries.insert(key, Entry::Ready(asset));
            }
        }
        for (asset, callbacks) in fired {
            for callback in callbacks {
                callback(&asset);
            }
        }
    }

    /// Synchronous convenience path: request, decode, complete.
    pub fn load_blocking(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &mut dyn MeshSource,
        path: &str,
    ) {
        if self.request(path) == LoadRequest::Start {
            let result = source.load_model(path);
            self.complete(device, queue, path, result);
        }
    }

    /// Drops every resolved entry. Geometry buffers are destroyed when the
    /// last batch referencing them is released.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.callbacks.clear();
    }
}

fn build_model(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &str,
    data: &ModelData,
) -> ModelAsset {
    let any_skinned = data.primitives.iter().any(|p| p.skin.is_some());

    // Per-primitive local spheres first; the combined sphere spans every
    // primitive's positions when the model carries a skin.
    let spheres: Vec<BoundingSphere> = data
        .primitives
        .iter()
        .map(|p| BoundingSphere::from_vertices(&p.mesh.vertices))
        .collect();
    let combined = spheres
        .iter()
        .skip(1)
        .fold(spheres.first().copied().unwrap_or_default(), |acc, s| {
            acc.union(s)
        });

    let mut primitives = Vec::with_capacity(data.primitives.len());
    for (index, primitive) in data.primitives.iter().enumerate() {
        let label = primitive
            .name
            .clone()
            .unwrap_or_else(|| format!("{path}#{index}"));
        let geometry = match Geometry::new(device, &label, &primitive.mesh) {
            Ok(geometry) => Arc::new(geometry),
            Err(err) => {
                log::warn!("Skipping primitive {label}: {err}");
                continue;
            }
        };

        let params = &primitive.material;
        let upload = |data: &Option<TextureData>, suffix: &str| {
            data.as_ref()
                .map(|t| Arc::new(t.upload(device, queue, &format!("{label} {suffix}"))))
        };
        let material = Arc::new(Material {
            albedo: upload(&params.albedo, "albedo"),
            normal: upload(&params.normal, "normal"),
            arm: upload(&params.arm, "arm"),
            emissive: upload(&params.emissive, "emissive"),
            alpha_mode: params.alpha_mode,
            opacity: if params.opacity > 0.0 { params.opacity } else { 1.0 },
            double_sided: params.double_sided,
            emissive_factor: params.emissive_factor.into(),
            specular_boost: params.specular_boost,
            luminance_alpha: params.luminance_alpha,
        });

        let skin = primitive.skin.as_ref().map(|s| {
            Arc::new(Skin {
                joints: s.joints.clone(),
                inverse_bind: s.inverse_bind.clone(),
                animations: s.animations.clone(),
            })
        });

        primitives.push(Arc::new(MeshAsset {
            name: primitive.name.clone(),
            bounding_sphere: if any_skinned {
                combined
            } else {
                spheres[index]
            },
            geometry,
            material,
            skin,
        }));
    }

    ModelAsset {
        bounding_sphere: combined,
        has_skin: any_skinned,
        primitives,
    }
}
