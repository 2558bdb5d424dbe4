//! The render graph: per-frame orchestration.
//!
//! Owns every pass, the shared targets, the history buffers and the frame
//! lifecycle. Passes execute in a fixed order because each consumes the
//! previous outputs: culling and batching on the CPU, then shadow, planar,
//! G-buffer, HiZ, tile light culling, SSAO, SSGI, deferred lighting,
//! volumetric fog, particles, bloom, post and CRT.
//!
//! A frame is guarded by an in-flight flag: if the previous submission has
//! not completed, the tick is skipped instead of queuing up. The resize
//! protocol spins on that flag, reconfigures the surface and recreates the
//! screen-sized targets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec2;

use crate::assets::AssetCache;
use crate::errors::Result;
use crate::gpu::{GpuBuffer, GpuContext, ResourceRegistry};
use crate::render::culling::{self, CullInput, OcclusionWarmup, SkinKey};
use crate::render::environment::Environment;
use crate::render::instances::{InstanceManager, RenderBatch};
use crate::render::lights::FrameLights;
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{
    BloomPass, CrtPass, GBufferPass, HiZPass, LightingPass, ParticlePass, ParticleSpawn,
    PlanarReflectionPass, PostPass, ShadowPass, SsaoPass, SsgiPass, TileLightPass,
    VolumetricFogPass,
};
use crate::render::skins::SkinBank;
use crate::render::targets::SharedTargets;
use crate::render::uniforms::{taa_jitter, CameraUniform};
use crate::scene::{Camera, EntityStore};
use crate::settings::Settings;
use crate::utils::time::FrameClock;

/// Per-frame counters surfaced to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub entities_tested: usize,
    pub instances_visible: usize,
    pub batches: usize,
    pub lights: u32,
    pub skipped: bool,
}

pub struct RenderGraph {
    pub targets: SharedTargets,
    registry: ResourceRegistry,
    environment: Environment,
    camera_buffer: GpuBuffer,
    instances: InstanceManager,
    skins: SkinBank,
    warmup: OcclusionWarmup,

    shadow: ShadowPass,
    planar: PlanarReflectionPass,
    gbuffer: GBufferPass,
    hiz: HiZPass,
    tile_lights: TileLightPass,
    ssao: SsaoPass,
    ssgi: SsgiPass,
    lighting: LightingPass,
    fog: VolumetricFogPass,
    particles: ParticlePass,
    bloom: BloomPass,
    post: PostPass,
    crt: CrtPass,

    /// Batches of the current frame; dropped at the next `begin_frame` so
    /// their pooled buffers return.
    batches: Vec<RenderBatch>,
    in_flight: Arc<AtomicBool>,
    frame_index: u64,
    clock: FrameClock,
    pub stats: FrameStats,
}

impl RenderGraph {
    #[must_use]
    pub fn new(gpu: &GpuContext, settings: &Settings) -> Self {
        let device = &gpu.device;
        let (width, height) = gpu.size();
        Self {
            targets: SharedTargets::new(device, width, height, settings),
            registry: ResourceRegistry::new(device, &gpu.queue, settings.noise.size),
            environment: Environment::placeholder(device, &gpu.queue),
            camera_buffer: GpuBuffer::new_uniform(
                device,
                "Camera Uniform",
                std::mem::size_of::<CameraUniform>() as u64,
            ),
            instances: InstanceManager::new(),
            skins: SkinBank::new(),
            warmup: OcclusionWarmup::new(),
            shadow: ShadowPass::new(device),
            planar: PlanarReflectionPass::new(device),
            gbuffer: GBufferPass::new(device),
            hiz: HiZPass::new(device),
            tile_lights: TileLightPass::new(device),
            ssao: SsaoPass::new(device),
            ssgi: SsgiPass::new(device),
            lighting: LightingPass::new(device),
            fog: VolumetricFogPass::new(device),
            particles: ParticlePass::new(gpu, settings),
            bloom: BloomPass::new(device),
            post: PostPass::new(device),
            crt: CrtPass::new(device, gpu.color_format()),
            batches: Vec::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            frame_index: 0,
            clock: FrameClock::new(),
            stats: FrameStats::default(),
        }
    }

    /// Resets the occlusion history, e.g. after a host-driven teleport.
    pub fn invalidate_occlusion_culling(&mut self, settings: &Settings) {
        self.warmup.invalidate(settings.occlusion_culling.warmup_frames);
        self.hiz.invalidate();
    }

    /// Queues particle spawn requests for the next frame.
    pub fn spawn_particles(&mut self, spawns: &[ParticleSpawn]) {
        self.particles.queue_spawns(spawns);
    }

    #[must_use]
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Host overlay texture composited by the post pass.
    pub fn set_gui_view(&mut self, view: Option<wgpu::TextureView>) {
        self.post.set_gui_view(view);
    }

    /// Renders one frame. Never panics; GPU anomalies abandon the frame and
    /// surface through the error return.
    pub fn render_frame(
        &mut self,
        gpu: &GpuContext,
        entities: &EntityStore,
        camera: &mut Camera,
        assets: &AssetCache,
        settings: &Settings,
    ) -> Result<()> {
        // Previous submission still executing: skip the tick entirely.
        if self.in_flight.load(Ordering::Acquire) {
            self.stats.skipped = true;
            return Ok(());
        }
        self.stats = FrameStats::default();

        let dt = self.clock.tick();
        let time = self.clock.elapsed();
        let frame_index = self.frame_index;
        self.frame_index += 1;

        self.targets.begin_frame();
        let screen = (self.targets.screen.width, self.targets.screen.height);

        // --- Camera snapshot + occlusion warmup ---
        let jitter = if settings.temporal.jitter {
            taa_jitter(frame_index, screen.0, screen.1, settings.temporal.jitter_scale)
        } else {
            Vec2::ZERO
        };
        let render_camera = camera.extract(screen.0 as f32 / screen.1 as f32, jitter);
        let skip_occlusion = self
            .warmup
            .update(&render_camera, &settings.occlusion_culling);
        let hiz_snapshot = if skip_occlusion {
            None
        } else {
            self.hiz.snapshot()
        };

        // --- CPU stage: culling, skinning, batching, shadows, lights ---
        let main_cull = culling::cull(&CullInput {
            entities,
            assets,
            camera: &render_camera,
            config: &settings.culling.main,
            occlusion: &settings.occlusion_culling,
            frustum_enabled: settings.culling.frustum_enabled,
            hi_z: hiz_snapshot.as_ref(),
            screen_height: screen.1,
            phase_buckets: settings.skinning.phase_buckets,
        });
        let shadow_cull = culling::cull(&CullInput {
            entities,
            assets,
            camera: &render_camera,
            config: &settings.culling.shadow,
            occlusion: &settings.occlusion_culling,
            frustum_enabled: false,
            hi_z: None,
            screen_height: screen.1,
            phase_buckets: settings.skinning.phase_buckets,
        });
        self.stats.entities_tested = main_cull.tested;
        self.stats.instances_visible = main_cull.visible;

        let skin_keys: Vec<SkinKey> = main_cull
            .groups
            .keys()
            .chain(shadow_cull.groups.keys())
            .filter_map(|key| key.skin.clone())
            .collect();
        self.skins.update(
            &gpu.device,
            &gpu.queue,
            assets,
            entities,
            skin_keys.into_iter(),
            dt,
            frame_index,
            settings.skinning.phase_buckets,
        );

        // Returning last frame's buffers requires last frame's batches to
        // be gone first.
        self.batches.clear();
        self.instances.begin_frame();
        self.batches =
            self.instances
                .build_batches(&gpu.device, &gpu.queue, &main_cull, assets);
        self.stats.batches = self.batches.len();

        let mut lights = FrameLights::collect(entities, settings, render_camera.position);
        self.shadow.build_frame(
            gpu,
            &self.targets,
            &self.registry,
            settings,
            &shadow_cull,
            &mut self.instances,
            &mut lights,
            &self.skins,
            assets,
            render_camera.position,
        );
        self.stats.lights = lights.count();
        if !lights.records.is_empty() {
            self.targets.light_buffer.write(&gpu.queue, &lights.records);
        }

        let camera_uniform = CameraUniform::build(
            &render_camera,
            settings,
            screen.0,
            screen.1,
            frame_index,
            time,
        );
        self.camera_buffer.write(&gpu.queue, &[camera_uniform]);

        // --- Surface acquisition; a lost surface abandons the frame ---
        let frame = match gpu.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(frame)
            | wgpu::CurrentSurfaceTexture::Suboptimal(frame) => frame,
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                log::warn!("Surface lost, reconfiguring");
                gpu.surface.configure(&gpu.device, &gpu.config);
                return Ok(());
            }
            err => {
                return Err(crate::errors::UmbraError::SurfaceConfigFailed(format!(
                    "{err:?}"
                )));
            }
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // --- Prepare phase, in run order; scene-color flips happen between
        // the composites' prepares so every pass pins its actual views ---
        let light_count = lights.count();
        macro_rules! ctx {
            () => {
                FrameContext {
                    gpu,
                    registry: &self.registry,
                    targets: &self.targets,
                    settings,
                    camera: &render_camera,
                    camera_buffer: &self.camera_buffer,
                    batches: &self.batches,
                    skins: &self.skins,
                    environment: &self.environment,
                    light_count,
                    frame_index,
                    time,
                    dt,
                }
            };
        }

        self.planar.prepare(&ctx!());
        self.gbuffer.prepare(&ctx!());
        self.hiz.prepare(&ctx!());
        self.tile_lights.prepare(&ctx!());
        self.ssao.prepare(&ctx!());
        self.ssgi.prepare(&ctx!());
        self.lighting.prepare(&ctx!());
        self.fog.prepare(&ctx!());
        if settings.volumetric_fog.enabled {
            self.targets.flip_scene_color();
        }
        self.particles.prepare(&ctx!());
        self.bloom.prepare(&ctx!());
        if settings.bloom.enabled {
            self.targets.flip_scene_color();
        }
        self.post.prepare(&ctx!());
        self.crt.prepare(&ctx!());

        // --- Record and submit ---
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let ctx = ctx!();
            self.shadow.run(&ctx, &mut encoder);
            self.planar.run(&ctx, &mut encoder);
            self.gbuffer.run(&ctx, &mut encoder);
            self.hiz.run(&ctx, &mut encoder);
            self.tile_lights.run(&ctx, &mut encoder);
            self.ssao.run(&ctx, &mut encoder);
            self.ssgi.run(&ctx, &mut encoder);
            self.lighting.run(&ctx, &mut encoder);
            self.fog.run(&ctx, &mut encoder);
            self.particles.run(&ctx, &mut encoder);
            self.bloom.run(&ctx, &mut encoder);
            self.post.run(&ctx, &mut encoder);
            self.crt.run_to_surface(&ctx, &mut encoder, &surface_view);
        }

        self.in_flight.store(true, Ordering::Release);
        let in_flight = self.in_flight.clone();
        gpu.queue.on_submitted_work_done(move || {
            in_flight.store(false, Ordering::Release);
        });
        gpu.queue.submit(Some(encoder.finish()));
        self.hiz.request_readback();
        let _ = gpu.device.poll(wgpu::PollType::Poll);
        frame.present();

        Ok(())
    }

    /// Resize protocol: wait for the in-flight submission, reconfigure the
    /// surface, recreate screen-sized resources. Idempotent for unchanged
    /// dimensions.
    pub fn resize(
        &mut self,
        gpu: &mut GpuContext,
        width: u32,
        height: u32,
        settings: &Settings,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        // Drain the in-flight frame with sub-millisecond polling.
        while self.in_flight.load(Ordering::Acquire) {
            let _ = gpu.device.poll(wgpu::PollType::Poll);
            std::thread::sleep(std::time::Duration::from_micros(200));
        }
        gpu.resize(width, height);
        self.targets.resize(&gpu.device, width, height, settings);
        self.hiz.invalidate();
        self.warmup.invalidate(settings.occlusion_culling.warmup_frames);

        let (w, h) = (self.targets.screen.width, self.targets.screen.height);
        self.gbuffer.resize(&gpu.device, w, h);
        self.lighting.resize(&gpu.device, w, h);
        self.post.resize(&gpu.device, w, h);
    }

    /// Destroys pooled and shared GPU resources. The graph is unusable
    /// afterwards.
    pub fn teardown(&mut self) {
        self.batches.clear();
        self.instances.teardown();
        self.targets.destroy();
    }
}
