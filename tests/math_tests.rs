//! Math Helper Tests
//!
//! Tests for:
//! - Octahedral encode/decode round trip
//! - Squircle distance iso-contours
//! - Halton sequence values (TAA jitter source)
//! - Vogel disk bounds
//! - Alignment helpers
//! - RGBE environment encoding round trip

use glam::{Vec2, Vec3};

use umbra::render::environment::{decode_rgbe, encode_rgbe};
use umbra::utils::math::{
    align_to, decode_octahedral, encode_octahedral, halton, next_power_of_two, squircle_distance,
    vogel_disk,
};

// ============================================================================
// Octahedral encoding
// ============================================================================

#[test]
fn octahedral_round_trip_on_axes_and_diagonals() {
    let directions = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
        Vec3::new(1.0, 1.0, 1.0).normalize(),
        Vec3::new(-1.0, 1.0, -1.0).normalize(),
        Vec3::new(0.3, -0.8, 0.52).normalize(),
        Vec3::new(-0.9, 0.1, -0.42).normalize(),
    ];
    for dir in directions {
        let decoded = decode_octahedral(encode_octahedral(dir));
        let error = (decoded - dir).abs().max_element();
        assert!(
            error < 1e-3,
            "Octahedral round trip of {dir:?} drifted by {error}"
        );
    }
}

#[test]
fn octahedral_uv_stays_in_unit_square() {
    for dir in [
        Vec3::new(0.1, -0.99, 0.1).normalize(),
        Vec3::new(-0.7, -0.7, 0.14).normalize(),
        Vec3::NEG_Y,
    ] {
        let uv = encode_octahedral(dir);
        assert!(
            (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y),
            "Encoded {dir:?} left the unit square: {uv:?}"
        );
    }
}

// ============================================================================
// Squircle distance
// ============================================================================

#[test]
fn squircle_is_zero_at_center() {
    assert!(squircle_distance(Vec2::ZERO, Vec2::ZERO, 10.0) < 1e-6);
}

#[test]
fn squircle_is_one_on_axis_at_half_width() {
    let d = squircle_distance(Vec2::new(10.0, 0.0), Vec2::ZERO, 10.0);
    assert!((d - 1.0).abs() < 1e-5);
}

#[test]
fn squircle_corner_bulges_past_the_circle() {
    // At (h, h) the power-4 norm gives 2^(1/4) ≈ 1.19, between the circle's
    // sqrt(2) and the square's 1.
    let d = squircle_distance(Vec2::new(10.0, 10.0), Vec2::ZERO, 10.0);
    assert!(d > 1.0 && d < std::f32::consts::SQRT_2, "Got {d}");
}

// ============================================================================
// Sequences
// ============================================================================

#[test]
fn halton_base_two_prefix() {
    assert!((halton(1, 2) - 0.5).abs() < 1e-6);
    assert!((halton(2, 2) - 0.25).abs() < 1e-6);
    assert!((halton(3, 2) - 0.75).abs() < 1e-6);
    assert!((halton(4, 2) - 0.125).abs() < 1e-6);
}

#[test]
fn vogel_disk_stays_in_unit_disk_with_growing_radius() {
    let mut last_radius = 0.0;
    for i in 0..16 {
        let p = vogel_disk(i, 16, 0.7);
        let r = p.length();
        assert!(r <= 1.0 + 1e-5, "Sample {i} escaped the disk: {r}");
        assert!(r >= last_radius, "Vogel radius grows monotonically");
        last_radius = r;
    }
}

// ============================================================================
// Alignment
// ============================================================================

#[test]
fn align_to_rounds_up() {
    assert_eq!(align_to(0, 256), 0);
    assert_eq!(align_to(1, 256), 256);
    assert_eq!(align_to(256, 256), 256);
    assert_eq!(align_to(257, 256), 512);
}

#[test]
fn next_power_of_two_values() {
    assert_eq!(next_power_of_two(0), 1);
    assert_eq!(next_power_of_two(1), 1);
    assert_eq!(next_power_of_two(3), 4);
    assert_eq!(next_power_of_two(1024), 1024);
    assert_eq!(next_power_of_two(1025), 2048);
}

// ============================================================================
// RGBE
// ============================================================================

#[test]
fn rgbe_round_trip_within_tolerance() {
    for rgb in [
        [1.0f32, 1.0, 1.0],
        [0.5, 0.25, 0.125],
        [12.0, 3.0, 0.7],
        [300.0, 150.0, 80.0],
    ] {
        let decoded = decode_rgbe(encode_rgbe(rgb));
        for c in 0..3 {
            let relative = (decoded[c] - rgb[c]).abs() / rgb[c].max(1e-3);
            assert!(
                relative < 0.02,
                "RGBE round trip of {rgb:?} channel {c}: {} vs {}",
                decoded[c],
                rgb[c]
            );
        }
    }
}

#[test]
fn rgbe_black_is_exact() {
    assert_eq!(encode_rgbe([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
    assert_eq!(decode_rgbe([0, 0, 0, 0]), [0.0, 0.0, 0.0]);
}
