//! Shadow System Tests
//!
//! Tests for:
//! - Cascade matrix construction (validity, coverage, centering)
//! - Spot matrix construction from position/direction/cone
//! - Squircle-based cascade selection (smallest covering cascade)
//! - Spot atlas slot LRU: assignment, persistence, eviction
//! - Spot shadow distance fade

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use umbra::render::lights::{spot_distance_fade, FrameLights, SpotCandidate};
use umbra::render::passes::shadow::{ShadowPass, SpotSlotAllocator};
use umbra::render::uniforms::GpuLight;
use umbra::settings::Settings;
use umbra::utils::math::squircle_distance;

const EPSILON: f32 = 1e-4;

// ============================================================================
// Cascade matrices
// ============================================================================

#[test]
fn cascade_matrix_is_finite_and_invertible() {
    let vp = ShadowPass::build_cascade_matrix(
        Vec3::new(10.0, 5.0, -20.0),
        Vec3::new(-0.35, -0.8, -0.45),
        48.0,
        2048,
    );
    assert!(vp.is_finite());
    assert!(vp.determinant().abs() > 1e-10, "Cascade VP must be invertible");
}

#[test]
fn cascade_covers_camera_footprint() {
    let camera = Vec3::new(3.0, 1.5, 7.0);
    let vp = ShadowPass::build_cascade_matrix(camera, Vec3::new(0.0, -1.0, 0.1), 24.0, 2048);
    // Ground points around the camera XZ must land inside the ortho volume.
    for offset in [
        Vec3::ZERO,
        Vec3::new(10.0, 0.0, 0.0),
        Vec3::new(-10.0, 0.0, 10.0),
        Vec3::new(0.0, 3.0, -10.0),
    ] {
        let p = Vec3::new(camera.x, 0.0, camera.z) + offset;
        let clip = vp * p.extend(1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(
            ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z),
            "Point {p:?} should be inside the cascade, got ndc {ndc:?}"
        );
    }
}

#[test]
fn degenerate_light_direction_falls_back() {
    let vp = ShadowPass::build_cascade_matrix(Vec3::ZERO, Vec3::ZERO, 12.0, 1024);
    assert!(vp.is_finite(), "Zero light direction must not produce NaN");
}

// ============================================================================
// Spot matrices
// ============================================================================

#[test]
fn spot_matrix_maps_cone_interior() {
    let position = Vec3::new(0.0, 3.0, 0.0);
    let direction = Vec3::NEG_Y;
    // 30 degree outer cone.
    let vp = ShadowPass::build_spot_matrix(position, direction, 30.0_f32.to_radians().cos(), 10.0);
    assert!(vp.determinant().abs() > 1e-10);

    // Straight below the light, inside the cone and range.
    let clip = vp * Vec3::new(0.0, 0.0, 0.0).extend(1.0);
    assert!(clip.w > 0.0);
    let ndc = clip.xyz() / clip.w;
    assert!(
        ndc.x.abs() < EPSILON && ndc.y.abs() < EPSILON,
        "Point on the axis projects to the slot center, got {ndc:?}"
    );
    assert!((0.0..=1.0).contains(&ndc.z));
}

#[test]
fn spot_matrix_point_behind_light_is_outside() {
    let vp = ShadowPass::build_spot_matrix(Vec3::ZERO, Vec3::NEG_Y, 0.85, 10.0);
    let clip = vp * Vec3::new(0.0, 5.0, 0.0).extend(1.0);
    assert!(clip.w <= 0.0, "Points behind the light have non-positive clip w");
}

// ============================================================================
// Cascade selection (squircle)
// ============================================================================

#[test]
fn cascade_selection_picks_smallest_covering() {
    let sizes = [12.0, 48.0, 192.0];
    let camera_xz = Vec2::ZERO;

    let select = |point: Vec2| -> Option<usize> {
        sizes
            .iter()
            .position(|&s| squircle_distance(point, camera_xz, s) < 1.0)
    };

    assert_eq!(select(Vec2::new(5.0, 0.0)), Some(0));
    assert_eq!(select(Vec2::new(30.0, 0.0)), Some(1));
    assert_eq!(select(Vec2::new(100.0, 100.0)), Some(2));
    assert_eq!(select(Vec2::new(500.0, 0.0)), None, "Beyond all cascades");
}

#[test]
fn squircle_boundary_is_continuous_with_blend_band() {
    // At squircle distance 1.0 of cascade i the shader has fully blended to
    // cascade i+1: the blend weight reaches exactly 1 at the boundary.
    let d = 1.0f32;
    let blend = ((d - 0.9) / 0.1).clamp(0.0, 1.0);
    assert!((blend - 1.0).abs() < f32::EPSILON);
}

// ============================================================================
// Spot slot LRU
// ============================================================================

fn spot(record: usize, key: u64, distance: f32) -> SpotCandidate {
    SpotCandidate {
        record,
        key,
        position: Vec3::new(distance, 3.0, 0.0),
        direction: Vec3::NEG_Y,
        outer_cone: 0.85,
        radius: 10.0,
        distance_to_camera: distance,
    }
}

fn lights_with_spots(spots: Vec<SpotCandidate>) -> FrameLights {
    let records = vec![GpuLight::default(); spots.len()];
    FrameLights { records, spots }
}

#[test]
fn single_spot_receives_slot_zero() {
    let mut allocator = SpotSlotAllocator::new();
    let settings = Settings::default();
    let mut lights = lights_with_spots(vec![spot(0, 7, 5.0)]);

    let assigned = allocator.assign(&mut lights, &settings);
    assert_eq!(assigned, vec![0]);
    assert_eq!(lights.records[0].shadow_index, 0);
}

#[test]
fn slots_persist_across_frames() {
    let mut allocator = SpotSlotAllocator::new();
    let settings = Settings::default();

    let mut lights = lights_with_spots(vec![spot(0, 1, 5.0), spot(1, 2, 8.0)]);
    allocator.assign(&mut lights, &settings);
    let first_slots = (lights.records[0].shadow_index, lights.records[1].shadow_index);

    // Same lights next frame, different visit order by distance.
    let mut lights = lights_with_spots(vec![spot(0, 2, 3.0), spot(1, 1, 9.0)]);
    allocator.assign(&mut lights, &settings);
    assert_eq!(
        lights.records[0].shadow_index, first_slots.1,
        "Light 2 keeps its slot across frames"
    );
    assert_eq!(lights.records[1].shadow_index, first_slots.0);
}

#[test]
fn far_spots_get_no_slot() {
    let mut allocator = SpotSlotAllocator::new();
    let settings = Settings::default();
    let far = settings.shadow.spot_max_distance + 100.0;
    let mut lights = lights_with_spots(vec![spot(0, 1, far)]);

    let assigned = allocator.assign(&mut lights, &settings);
    assert!(assigned.is_empty());
    assert_eq!(
        lights.records[0].shadow_index, -1,
        "Past the max distance a spot keeps shadow_index -1"
    );
}

#[test]
fn closest_spots_win_when_over_capacity() {
    let mut allocator = SpotSlotAllocator::new();
    let settings = Settings::default();
    let max = settings.shadow.max_spot_shadows as usize;

    // Twice the capacity, distances 1..=2N.
    let spots: Vec<_> = (0..max * 2)
        .map(|i| spot(i, i as u64 + 1, (i + 1) as f32))
        .collect();
    let mut lights = lights_with_spots(spots);
    let assigned = allocator.assign(&mut lights, &settings);
    assert_eq!(assigned.len(), max);

    for i in 0..max {
        assert!(lights.records[i].shadow_index >= 0, "Close spot {i} has a slot");
    }
    for i in max..max * 2 {
        assert_eq!(lights.records[i].shadow_index, -1, "Far spot {i} has none");
    }
}

#[test]
fn lru_evicts_stalest_light() {
    let mut allocator = SpotSlotAllocator::new();
    let mut settings = Settings::default();
    settings.shadow.max_spot_shadows = 2;

    // Frame 1: lights 1 and 2 hold both slots.
    let mut lights = lights_with_spots(vec![spot(0, 1, 1.0), spot(1, 2, 2.0)]);
    allocator.assign(&mut lights, &settings);

    // Frame 2: only light 2 is present, refreshing its slot.
    let mut lights = lights_with_spots(vec![spot(0, 2, 2.0)]);
    allocator.assign(&mut lights, &settings);
    let slot_of_2 = lights.records[0].shadow_index;

    // Frame 3: lights 2 and 3; light 3 must take light 1's stale slot.
    let mut lights = lights_with_spots(vec![spot(0, 2, 2.0), spot(1, 3, 3.0)]);
    allocator.assign(&mut lights, &settings);
    assert_eq!(lights.records[0].shadow_index, slot_of_2, "Light 2 undisturbed");
    assert!(lights.records[1].shadow_index >= 0, "Light 3 got the evicted slot");
    assert_ne!(lights.records[1].shadow_index, slot_of_2);
}

// ============================================================================
// Spot distance fade
// ============================================================================

#[test]
fn spot_fade_is_one_near_and_zero_at_max() {
    let settings = Settings::default();
    let max = settings.shadow.spot_max_distance;
    let start = max * settings.shadow.spot_fade_start;

    assert!((spot_distance_fade(start * 0.5, &settings) - 1.0).abs() < EPSILON);
    assert!(spot_distance_fade(max, &settings) < EPSILON);

    let mid = spot_distance_fade((start + max) * 0.5, &settings);
    assert!((mid - 0.5).abs() < 0.01, "Halfway through the band the fade is 0.5");
}

#[test]
fn teleported_spot_loses_shadow() {
    // A spot teleported to 1000 m: no slot, fade 0, so the shader applies
    // the constant minimum shadow.
    let settings = Settings::default();
    let mut allocator = SpotSlotAllocator::new();

    let mut lights = lights_with_spots(vec![spot(0, 9, 5.0)]);
    allocator.assign(&mut lights, &settings);
    assert_eq!(lights.records[0].shadow_index, 0);

    let mut lights = lights_with_spots(vec![spot(0, 9, 1000.0)]);
    allocator.assign(&mut lights, &settings);
    assert_eq!(lights.records[0].shadow_index, -1);
    assert!(spot_distance_fade(1000.0, &settings) < EPSILON);
}

// ============================================================================
// Light collection
// ============================================================================

#[test]
fn light_records_default_to_no_shadow() {
    let record = GpuLight::default();
    assert_eq!(record.shadow_index, 0);
    // Collected records start at -1; the default struct is only the zeroed
    // GPU layout.
    let settings = Settings::default();
    let mut store = umbra::scene::EntityStore::new();
    store.create(umbra::scene::EntityDesc {
        position: Vec3::new(0.0, 3.0, 0.0),
        light: Some(umbra::scene::LightDesc {
            kind: umbra::scene::LightKind::Spot,
            color: Vec4::new(1.0, 1.0, 1.0, 5.0),
            ..umbra::scene::LightDesc::default()
        }),
        ..umbra::scene::EntityDesc::default()
    });
    let lights = FrameLights::collect(&store, &settings, Vec3::ZERO);
    assert_eq!(lights.records.len(), 1);
    assert_eq!(lights.records[0].shadow_index, -1);
    assert_eq!(lights.spots.len(), 1);
}
