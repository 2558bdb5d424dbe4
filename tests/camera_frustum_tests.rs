//! Camera and Frustum Tests
//!
//! Tests for:
//! - Projection matrix generation and the linear-depth camera contract
//! - View matrix as inverse of the camera world transform
//! - Frustum plane extraction (Gribb-Hartmann, normalized planes)
//! - Frustum-sphere and frustum-AABB intersection
//! - Previous-frame matrix tracking for motion vectors

use glam::{Vec2, Vec3, Vec4Swizzles};

use umbra::scene::camera::{Camera, Frustum};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn test_camera() -> Camera {
    Camera::new(70.0, 0.05, 5000.0)
}

// ============================================================================
// Projection and view matrices
// ============================================================================

#[test]
fn view_matrix_is_inverse_of_world() {
    let mut cam = test_camera();
    cam.position = Vec3::new(1.0, 2.0, 3.0);
    let view = cam.view_matrix();
    let point = Vec3::new(4.0, 5.0, 6.0);
    let round_trip = view.inverse().transform_point3(view.transform_point3(point));
    assert!(
        round_trip.distance(point) < EPSILON,
        "view * view^-1 should round-trip points, got {round_trip:?}"
    );
}

#[test]
fn camera_at_origin_sees_negative_z() {
    let mut cam = test_camera();
    let rc = cam.extract(1.0, Vec2::ZERO);
    let clip = rc.view_projection_matrix * Vec3::new(0.0, 0.0, -10.0).extend(1.0);
    assert!(clip.w > 0.0, "Point in front should have positive clip w");
    let ndc = clip.xyz() / clip.w;
    assert!(approx(ndc.x, 0.0) && approx(ndc.y, 0.0), "Centered point should project to NDC center");
    assert!(ndc.z > 0.0 && ndc.z < 1.0, "Depth should be in [0, 1], got {}", ndc.z);
}

#[test]
fn degenerate_near_far_still_produces_finite_matrix() {
    let mut cam = Camera::new(70.0, 1.0, 1.0);
    let rc = cam.extract(1.0, Vec2::ZERO);
    assert!(rc.projection_matrix.is_finite(), "near == far must not produce NaN");
}

#[test]
fn jitter_offsets_projection_only() {
    let mut cam = test_camera();
    let jitter = Vec2::new(0.25, -0.25);
    let rc = cam.extract(1.0, jitter);
    // The frustum is built from the unjittered matrix, so a centered point
    // stays well inside regardless of jitter.
    assert!(rc.frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 0.1));
    assert!(approx(rc.jitter.x, jitter.x) && approx(rc.jitter.y, jitter.y));
}

#[test]
fn prev_view_projection_lags_one_frame() {
    let mut cam = test_camera();
    let first = cam.extract(1.0, Vec2::ZERO);
    // First frame has no history; previous must equal current.
    assert_eq!(first.prev_view_projection, first.view_projection_matrix);

    cam.position = Vec3::new(0.0, 0.0, 5.0);
    let second = cam.extract(1.0, Vec2::ZERO);
    assert_eq!(
        second.prev_view_projection, first.view_projection_matrix,
        "Second frame's history should be the first frame's matrix"
    );
    assert_ne!(second.prev_view_projection, second.view_projection_matrix);
}

// ============================================================================
// Frustum extraction
// ============================================================================

fn make_frustum() -> Frustum {
    let mut cam = test_camera();
    cam.extract(1.0, Vec2::ZERO).frustum
}

#[test]
fn frustum_plane_normals_are_unit_length() {
    let frustum = make_frustum();
    for (i, plane) in frustum.planes.iter().enumerate() {
        let len = plane.xyz().length();
        assert!(
            approx(len, 1.0),
            "Plane {i} normal should be unit length, got {len}"
        );
    }
}

#[test]
fn near_plane_passes_through_camera_origin() {
    let mut cam = test_camera();
    cam.position = Vec3::new(3.0, -2.0, 7.0);
    let frustum = cam.extract(1.0, Vec2::ZERO).frustum;
    let distance = frustum.distance(4, cam.position);
    assert!(
        distance.abs() < 1e-3,
        "Near plane signed distance at the camera origin should be zero, got {distance}"
    );
}

#[test]
fn frustum_sphere_inside() {
    let frustum = make_frustum();
    assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
}

#[test]
fn frustum_sphere_outside_left() {
    let frustum = make_frustum();
    assert!(!frustum.intersects_sphere(Vec3::new(-1000.0, 0.0, -5.0), 1.0));
}

#[test]
fn frustum_sphere_behind_camera() {
    let frustum = make_frustum();
    assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
}

#[test]
fn frustum_large_sphere_straddles() {
    let frustum = make_frustum();
    assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 100.0));
}

#[test]
fn frustum_aabb_inside_and_outside() {
    let frustum = make_frustum();
    assert!(frustum.intersects_box(Vec3::new(-0.5, -0.5, -6.0), Vec3::new(0.5, 0.5, -4.0)));
    assert!(!frustum.intersects_box(
        Vec3::new(-1002.0, -1002.0, -6.0),
        Vec3::new(-1000.0, -1000.0, -4.0)
    ));
    assert!(!frustum.intersects_box(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 10.0)));
}

#[test]
fn look_at_orients_forward() {
    let mut cam = test_camera();
    cam.position = Vec3::new(0.0, 0.0, 5.0);
    cam.look_at(Vec3::ZERO);
    let forward = cam.forward();
    assert!(
        forward.dot(Vec3::NEG_Z) > 0.999,
        "Camera at +Z looking at origin should face -Z, got {forward:?}"
    );
}
