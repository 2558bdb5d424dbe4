//! Instance Packing and Pool Tests
//!
//! Tests for:
//! - Pool capacity rounding (power of two with a 1000 floor)
//! - The 28-float / 112-byte instance packing layout
//! - The negative-radius static-instance marker
//! - The sphere intersection helper used by the cascade filter

use glam::{Mat4, Quat, Vec3, Vec4};

use umbra::render::culling::VisibleEntry;
use umbra::render::instances::{pack_entries, round_capacity, spheres_intersect, MIN_POOL_CAPACITY};
use umbra::resources::INSTANCE_STRIDE;
use umbra::scene::BillboardMode;

fn entry(world: Mat4, sphere: Vec4, is_static: bool) -> VisibleEntry {
    VisibleEntry {
        entity: umbra::scene::EntityId::default(),
        distance: 1.0,
        fade: 1.0,
        world,
        sphere,
        uv_transform: Vec4::new(0.0, 0.0, 1.0, 1.0),
        color: Vec4::ONE,
        is_static,
        billboard: BillboardMode::None,
        skin_key: None,
    }
}

// ============================================================================
// Pool capacity rounding
// ============================================================================

#[test]
fn capacity_has_floor_of_1000() {
    assert_eq!(round_capacity(1), MIN_POOL_CAPACITY);
    assert_eq!(round_capacity(512), MIN_POOL_CAPACITY);
    assert_eq!(round_capacity(999), MIN_POOL_CAPACITY);
}

#[test]
fn capacity_rounds_to_next_power_of_two() {
    assert_eq!(round_capacity(1000), 1024);
    assert_eq!(round_capacity(1024), 1024);
    assert_eq!(round_capacity(1025), 2048);
    assert_eq!(round_capacity(5000), 8192);
}

#[test]
fn capacity_is_monotonic() {
    let mut last = 0;
    for count in [1, 100, 1000, 1500, 3000, 10_000] {
        let capacity = round_capacity(count);
        assert!(capacity >= count, "Capacity always fits the request");
        assert!(capacity >= last, "Capacity never shrinks for growing requests");
        last = capacity;
    }
}

// ============================================================================
// Packing layout
// ============================================================================

#[test]
fn one_instance_packs_to_112_bytes() {
    let packed = pack_entries(&[entry(Mat4::IDENTITY, Vec4::new(0.0, 0.0, 0.0, 0.5), false)]);
    assert_eq!(packed.len() * 4, INSTANCE_STRIDE as usize);
    assert_eq!(packed.len(), 28);
}

#[test]
fn packing_layout_matches_shader_contract() {
    let world = Mat4::from_scale_rotation_translation(
        Vec3::new(2.0, 2.0, 2.0),
        Quat::IDENTITY,
        Vec3::new(1.0, 2.0, 3.0),
    );
    let sphere = Vec4::new(1.0, 2.0, 3.0, 1.5);
    let mut e = entry(world, sphere, false);
    e.uv_transform = Vec4::new(0.1, 0.2, 0.5, 0.5);
    e.color = Vec4::new(0.9, 0.8, 0.7, 0.6);

    let packed = pack_entries(&[e]);
    // Model matrix occupies floats 0..16, column major.
    assert_eq!(&packed[0..16], &world.to_cols_array());
    // Bounding sphere at 16..20.
    assert_eq!(&packed[16..20], &[1.0, 2.0, 3.0, 1.5]);
    // UV transform at 20..24.
    assert_eq!(&packed[20..24], &[0.1, 0.2, 0.5, 0.5]);
    // Instance color at 24..28.
    assert_eq!(&packed[24..28], &[0.9, 0.8, 0.7, 0.6]);
}

#[test]
fn static_instances_carry_negative_radius() {
    let sphere = Vec4::new(0.0, 0.0, 0.0, 2.5);
    let packed = pack_entries(&[entry(Mat4::IDENTITY, sphere, true)]);
    assert_eq!(packed[19], -2.5, "Static instances flag pixel rounding off via sign");

    let packed = pack_entries(&[entry(Mat4::IDENTITY, sphere, false)]);
    assert_eq!(packed[19], 2.5);
}

#[test]
fn multiple_instances_pack_contiguously() {
    let entries: Vec<_> = (0..3)
        .map(|i| {
            entry(
                Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
                Vec4::new(i as f32, 0.0, 0.0, 1.0),
                false,
            )
        })
        .collect();
    let packed = pack_entries(&entries);
    assert_eq!(packed.len(), 3 * 28);
    for (i, chunk) in packed.chunks(28).enumerate() {
        assert_eq!(chunk[12], i as f32, "Translation column lands at float 12");
        assert_eq!(chunk[16], i as f32, "Sphere center x lands at float 16");
    }
}

// ============================================================================
// Sphere intersection helper
// ============================================================================

#[test]
fn sphere_intersection_basic() {
    let a = Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert!(spheres_intersect(a, Vec4::new(1.5, 0.0, 0.0, 1.0)));
    assert!(!spheres_intersect(a, Vec4::new(3.0, 0.0, 0.0, 0.5)));
}

#[test]
fn sphere_intersection_ignores_radius_sign() {
    let a = Vec4::new(0.0, 0.0, 0.0, -1.0);
    assert!(
        spheres_intersect(a, Vec4::new(1.5, 0.0, 0.0, 1.0)),
        "The static marker sign must not break the cascade filter"
    );
}
