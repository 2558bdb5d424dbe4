//! The render node trait and the per-frame context.

use crate::gpu::{GpuBuffer, GpuContext, ResourceRegistry};
use crate::render::environment::Environment;
use crate::render::instances::RenderBatch;
use crate::render::skins::SkinBank;
use crate::render::targets::SharedTargets;
use crate::scene::RenderCamera;
use crate::settings::Settings;

/// Borrowed view of everything a pass may read during a frame.
///
/// The render graph owns all of it; passes keep no references past the
/// frame. All mutation (history flips, buffer pools, slot maps) happens in
/// the graph between passes, never inside one.
pub struct FrameContext<'a> {
    pub gpu: &'a GpuContext,
    pub registry: &'a ResourceRegistry,
    pub targets: &'a SharedTargets,
    pub settings: &'a Settings,
    pub camera: &'a RenderCamera,
    /// Per-frame camera uniform, written once by the graph.
    pub camera_buffer: &'a GpuBuffer,
    pub batches: &'a [RenderBatch],
    pub skins: &'a SkinBank,
    pub environment: &'a Environment,
    /// Number of valid records in the light buffer.
    pub light_count: u32,
    pub frame_index: u64,
    pub time: f32,
    pub dt: f32,
}

/// One pass of the render graph.
///
/// `prepare` may allocate pass-internal resources and rebuild bind groups;
/// `run` records GPU commands and must not touch pass state. `resize` must
/// be idempotent.
pub trait RenderNode {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, _ctx: &FrameContext<'_>) {}

    fn run(&self, ctx: &FrameContext<'_>, encoder: &mut wgpu::CommandEncoder);

    /// Screen-sized pass resources were recreated; drop any cached views.
    fn resize(&mut self, _device: &wgpu::Device, _width: u32, _height: u32) {}
}
