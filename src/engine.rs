//! Engine facade: scene API, asset entry points, frame loop.

use glam::Vec3;

use crate::assets::{AssetCache, LoadRequest, MeshSource, ModelData};
use crate::errors::Result;
use crate::gpu::GpuContext;
use crate::render::passes::ParticleSpawn;
use crate::render::RenderGraph;
use crate::scene::{Camera, Entity, EntityDesc, EntityId, EntityStore};
use crate::settings::Settings;

/// Engine lifecycle state. The frame loop dispatches on it: a degraded
/// engine keeps a valid handle for teardown but renders nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Degraded(String),
    Stopped(String),
}

pub struct Engine {
    pub gpu: GpuContext,
    pub settings: Settings,
    pub entities: EntityStore,
    pub camera: Camera,
    pub assets: AssetCache,
    graph: RenderGraph,
    state: EngineState,
}

impl Engine {
    /// Creates the engine over a host-provided surface target. The settings
    /// patch is deep-merged over the defaults.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        settings_patch: Option<&serde_json::Value>,
    ) -> Result<Self> {
        let settings = match settings_patch {
            Some(patch) => Settings::from_patch(patch)?,
            None => Settings::default(),
        };
        let gpu = GpuContext::new(target, width, height, &settings).await?;
        let graph = RenderGraph::new(&gpu, &settings);
        let camera = Camera::new(settings.camera.fov, settings.camera.near, settings.camera.far);

        Ok(Self {
            gpu,
            graph,
            camera,
            settings,
            entities: EntityStore::new(),
            assets: AssetCache::new(),
            state: EngineState::Running,
        })
    }

    // ========================================================================
    // Scene API
    // ========================================================================

    pub fn create_entity(&mut self, desc: EntityDesc) -> EntityId {
        let model = desc.model.clone();
        let id = self.entities.create(desc);
        if let Some(model) = model {
            if let Some(asset) = self.assets.get(&model) {
                self.entities
                    .update(id, |e| e.bounding_sphere = asset.bounding_sphere);
            }
        }
        id
    }

    pub fn update_entity(&mut self, id: EntityId, mutate: impl FnOnce(&mut Entity)) {
        self.entities.update(id, mutate);
    }

    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        self.entities.delete(id)
    }

    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Registers interest in a model; returns whether the host should run
    /// its decoder for this path.
    pub fn request_asset(&self, key: &str) -> LoadRequest {
        self.assets.request(key)
    }

    /// Delivers a decode result and propagates the new bounding spheres to
    /// every entity referencing the model.
    pub fn complete_asset(&mut self, path: &str, result: Result<ModelData>) {
        self.assets
            .complete(&self.gpu.device, &self.gpu.queue, path, result);
        if let Some(asset) = self.assets.get(path) {
            self.entities.resolve_bounds(path, asset.bounding_sphere);
            for primitive in &asset.primitives {
                if let Some(name) = &primitive.name {
                    self.entities
                        .resolve_bounds(&format!("{path}|{name}"), primitive.bounding_sphere);
                }
            }
        }
    }

    /// Synchronous load path for native hosts and tests.
    pub fn load_asset_blocking(&mut self, source: &mut dyn MeshSource, path: &str) {
        if self.assets.request(path) == LoadRequest::Start {
            let result = source.load_model(path);
            self.complete_asset(path, result);
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Renders one frame, dispatching on the engine state. Frame errors
    /// degrade the engine instead of propagating.
    pub fn render_frame(&mut self) {
        match &self.state {
            EngineState::Running => {}
            EngineState::Degraded(_) | EngineState::Stopped(_) => return,
        }
        let result = self.graph.render_frame(
            &self.gpu,
            &self.entities,
            &mut self.camera,
            &self.assets,
            &self.settings,
        );
        if let Err(err) = result {
            log::error!("Frame failed, engine degraded: {err}");
            self.state = EngineState::Degraded(err.to_string());
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.graph
            .resize(&mut self.gpu, width, height, &self.settings);
    }

    /// Resets the HiZ warmup, e.g. after a teleport.
    pub fn invalidate_occlusion_culling(&mut self) {
        self.graph.invalidate_occlusion_culling(&self.settings);
    }

    pub fn spawn_particles(&mut self, spawns: &[ParticleSpawn]) {
        self.graph.spawn_particles(spawns);
    }

    /// Replaces the environment map with host-decoded RGBE pixels.
    pub fn set_environment_rgbe(
        &mut self,
        width: u32,
        height: u32,
        rgbe_pixels: &[u8],
        encoding: crate::render::environment::EnvEncoding,
    ) {
        self.graph.environment_mut().set_rgbe(
            &self.gpu.device,
            &self.gpu.queue,
            width,
            height,
            rgbe_pixels,
            encoding,
        );
    }

    /// Host overlay composited by the post pass.
    pub fn set_gui_view(&mut self, view: Option<wgpu::TextureView>) {
        self.graph.set_gui_view(view);
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[must_use]
    pub fn stats(&self) -> crate::render::FrameStats {
        self.graph.stats
    }

    #[must_use]
    pub fn camera_position(&self) -> Vec3 {
        self.camera.position
    }

    /// Stops rendering and releases GPU resources. The handle stays valid.
    pub fn shutdown(&mut self, reason: &str) {
        self.graph.teardown();
        self.assets.clear();
        self.state = EngineState::Stopped(reason.to_string());
    }
}
