//! GPU Layout Tests
//!
//! The byte layouts here are cross-pass contracts mirrored in WGSL structs;
//! any drift breaks rendering silently, so the sizes and offsets are pinned.

use umbra::render::passes::particles::{ParticleSpawn, PARTICLE_STRIDE};
use umbra::render::uniforms::{BatchUniform, CameraUniform, GpuLight, LightingUniform, TileCullUniform};
use umbra::resources::geometry::{
    instance_layout, vertex_layout, INSTANCE_FLOATS, INSTANCE_STRIDE, VERTEX_FLOATS, VERTEX_STRIDE,
};

// ============================================================================
// Record sizes
// ============================================================================

#[test]
fn light_record_is_96_bytes() {
    assert_eq!(std::mem::size_of::<GpuLight>(), 96);
}

#[test]
fn camera_uniform_size() {
    // 6 matrices + 10 vec4 parameter rows.
    assert_eq!(std::mem::size_of::<CameraUniform>(), 6 * 64 + 10 * 16);
}

#[test]
fn batch_uniform_is_one_cache_line() {
    assert_eq!(std::mem::size_of::<BatchUniform>(), 64);
}

#[test]
fn tile_cull_uniform_size() {
    assert_eq!(std::mem::size_of::<TileCullUniform>(), 2 * 64 + 2 * 16);
}

#[test]
fn lighting_uniform_size() {
    assert_eq!(std::mem::size_of::<LightingUniform>(), 11 * 16);
}

#[test]
fn particle_records() {
    assert_eq!(std::mem::size_of::<ParticleSpawn>(), 64);
    assert_eq!(PARTICLE_STRIDE, 80);
}

// ============================================================================
// Vertex / instance layout
// ============================================================================

#[test]
fn vertex_stride_is_80_bytes() {
    assert_eq!(VERTEX_FLOATS, 20);
    assert_eq!(VERTEX_STRIDE, 80);
    assert_eq!(vertex_layout().array_stride, 80);
}

#[test]
fn instance_stride_is_112_bytes() {
    assert_eq!(INSTANCE_FLOATS, 28);
    assert_eq!(INSTANCE_STRIDE, 112);
    assert_eq!(instance_layout().array_stride, 112);
}

#[test]
fn vertex_attributes_cover_locations_0_to_5() {
    let layout = vertex_layout();
    let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12, 20, 32, 48, 64]);
    let locations: Vec<u32> = layout.attributes.iter().map(|a| a.shader_location).collect();
    assert_eq!(locations, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(
        layout.attributes[5].format,
        wgpu::VertexFormat::Uint32x4,
        "Joint indices are unsigned integers reinterpreted from the float array"
    );
}

#[test]
fn instance_attributes_cover_locations_6_to_12() {
    let layout = instance_layout();
    assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
    let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 16, 32, 48, 64, 80, 96]);
    let locations: Vec<u32> = layout.attributes.iter().map(|a| a.shader_location).collect();
    assert_eq!(locations, vec![6, 7, 8, 9, 10, 11, 12]);
}

// ============================================================================
// Derived buffer lengths
// ============================================================================

#[test]
fn tile_light_list_length_formula() {
    // One count word plus the per-tile index capacity.
    let tiles_x = 120u64;
    let tiles_y = 68u64;
    let max_per_tile = 256u64;
    let words = tiles_x * tiles_y * (1 + max_per_tile);
    assert_eq!(words, 120 * 68 * 257);
}
