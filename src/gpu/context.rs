//! WGPU context.
//!
//! [`GpuContext`] holds the device, queue, surface and surface configuration
//! and owns the surface `configure` call exclusively. Feature negotiation
//! happens once at creation: optional features (timestamp queries) degrade
//! to off instead of failing device acquisition.

use log::{info, warn};

use crate::errors::{Result, UmbraError};
use crate::settings::Settings;

/// Core GPU context.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,

    /// Whether timestamp queries were granted during negotiation.
    pub timestamps_enabled: bool,
}

impl GpuContext {
    /// Acquires an adapter and device and configures the surface.
    ///
    /// The host supplies the window or canvas handle; everything after that
    /// point belongs to the engine.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        settings: &Settings,
    ) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|e| UmbraError::AdapterRequestFailed(e.to_string()))?;

        let power_preference = if settings.engine.high_performance_adapter {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::LowPower
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| UmbraError::AdapterRequestFailed(e.to_string()))?;

        // Feature negotiation: optional features downgrade instead of failing.
        let mut requested_features = wgpu::Features::empty();
        let mut timestamps_enabled = false;
        if settings.performance.timestamps {
            if adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
                requested_features |= wgpu::Features::TIMESTAMP_QUERY;
                timestamps_enabled = true;
            } else {
                warn!("Timestamp queries unsupported by adapter, disabling");
            }
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Umbra Device"),
                required_features: requested_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| {
                UmbraError::SurfaceConfigFailed("Surface not supported by adapter".to_string())
            })?;

        config.present_mode = if settings.engine.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &config);

        info!(
            "GPU context ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.width,
            config.height,
            config.format,
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            timestamps_enabled,
        })
    }

    /// Reconfigures the surface. A call with the current dimensions is a no-op.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    #[must_use]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
