//! Bloom: soft-thresholded bright pass, Gaussian mip pyramid, masked
//! additive composite.
//!
//! The bright pass extracts pixels by max-RGB brightness with an
//! exponential knee below the threshold and a hard clamp, boosting pixels
//! whose emissive contribution exceeds 1. The pyramid downsamples with a
//! Gaussian tap pattern and walks back up additively. The composite masks
//! bloom by `(1 - scene luminance)²` so glow reads in dark regions around
//! bright pixels, then the graph flips the scene color.

use glam::Vec4;

use crate::gpu::{GpuBuffer, HDR_FORMAT};
use crate::render::node::{FrameContext, RenderNode};
use crate::render::passes::{fullscreen_pipeline, sampler_entry, texture_entry, uniform_entry};

const BLOOM_WGSL: &str = include_str!("../../shaders/bloom.wgsl");

pub struct BloomPass {
    bright_pipeline: wgpu::RenderPipeline,
    sample_pipeline: wgpu::RenderPipeline,
    upsample_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    single_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    uniform: GpuBuffer,

    bright_bind_group: Option<wgpu::BindGroup>,
    mip_bind_groups: Vec<wgpu::BindGroup>,
    mip_views: Vec<wgpu::TextureView>,
    composite_bind_group: Option<wgpu::BindGroup>,
    composite_target: Option<wgpu::TextureView>,
    enabled: bool,
}

impl BloomPass {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let single_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Single Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Composite Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });

        let additive = wgpu::ColorTargetState {
            format: HDR_FORMAT,
            blend: Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
            write_mask: wgpu::ColorWrites::ALL,
        };

        Self {
            bright_pipeline: fullscreen_pipeline(
                device,
                "Bloom Bright",
                &single_layout,
                BLOOM_WGSL,
                "fs_bright",
                &[Some(HDR_FORMAT.into())],
            ),
            sample_pipeline: fullscreen_pipeline(
                device,
                "Bloom Downsample",
                &single_layout,
                BLOOM_WGSL,
                "fs_downsample",
                &[Some(HDR_FORMAT.into())],
            ),
            upsample_pipeline: fullscreen_pipeline(
                device,
                "Bloom Upsample",
                &single_layout,
                BLOOM_WGSL,
                "fs_upsample",
                &[Some(additive)],
            ),
            composite_pipeline: fullscreen_pipeline(
                device,
                "Bloom Composite",
                &composite_layout,
                BLOOM_WGSL,
                "fs_composite",
                &[Some(HDR_FORMAT.into())],
            ),
            single_layout,
            composite_layout,
            uniform: GpuBuffer::new_uniform(device, "Bloom Uniform", 32),
            bright_bind_group: None,
            mip_bind_groups: Vec::new(),
            mip_views: Vec::new(),
            composite_bind_group: None,
            composite_target: None,
            enabled: false,
        }
    }

    fn single_bind_group(
        &self,
        device: &wgpu::Device,
        sampler: &wgpu::Sampler,
        a: &wgpu::TextureView,
        b: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom BindGroup"),
            layout: &self.single_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

impl RenderNode for BloomPass {
    fn name(&self) -> &'static str {
        "Bloom Pass"
    }

    fn prepare(&mut self, ctx: &FrameContext<'_>) {
        self.enabled = ctx.settings.bloom.enabled;
        if !self.enabled {
            return;
        }
        let device = &ctx.gpu.device;
        let screen = &ctx.targets.screen;
        let cfg = &ctx.settings.bloom;

        self.uniform.write(
            &ctx.gpu.queue,
            &[Vec4::new(cfg.threshold, cfg.knee, cfg.max_brightness, cfg.strength),
              Vec4::new(cfg.emissive_boost, 0.0, 0.0, 0.0)],
        );

        let sampler = &ctx.registry.samplers.linear_clamp;

        // Mip views for the pyramid walk.
        self.mip_views = (0..screen.bloom_mip_count)
            .map(|level| screen.bloom.mip_view(level))
            .collect();

        // Bright pass: scene color + emission -> mip 0.
        self.bright_bind_group = Some(self.single_bind_group(
            device,
            sampler,
            &ctx.targets.hdr().view,
            &screen.gbuffer.emission.view,
        ));

        // Down then up: bind group i samples mip i.
        self.mip_bind_groups = self
            .mip_views
            .iter()
            .map(|view| self.single_bind_group(device, sampler, view, view))
            .collect();

        // Composite reads scene + bloom, writes the other HDR buffer.
        self.composite_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Composite BindGroup"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.hdr().view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&screen.bloom.mip_view(0)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        }));
        self.composite_target = Some(ctx.targets.prev_hdr().view.clone());
    }

    fn run(&self, _ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder) {
        if !self.enabled {
            return;
        }
        let (Some(bright), Some(composite), Some(target)) = (
            &self.bright_bind_group,
            &self.composite_bind_group,
            &self.composite_target,
        ) else {
            return;
        };

        let draw = |encoder: &mut wgpu::CommandEncoder,
                    label: &str,
                    view: &wgpu::TextureView,
                    pipeline: &wgpu::RenderPipeline,
                    bind_group: &wgpu::BindGroup,
                    clear: bool| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if clear {
                            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        };

        draw(encoder, "Bloom Bright", &self.mip_views[0], &self.bright_pipeline, bright, true);

        // Downsample mip i -> i + 1.
        for i in 0..self.mip_views.len().saturating_sub(1) {
            draw(
                encoder,
                "Bloom Downsample",
                &self.mip_views[i + 1],
                &self.sample_pipeline,
                &self.mip_bind_groups[i],
                true,
            );
        }
        // Upsample mip i + 1 -> i, additive.
        for i in (0..self.mip_views.len().saturating_sub(1)).rev() {
            draw(
                encoder,
                "Bloom Upsample",
                &self.mip_views[i],
                &self.upsample_pipeline,
                &self.mip_bind_groups[i + 1],
                false,
            );
        }

        draw(encoder, "Bloom Composite", target, &self.composite_pipeline, composite, true);
    }
}
