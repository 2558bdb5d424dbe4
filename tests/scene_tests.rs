//! Scene and Resource Tests
//!
//! Tests for:
//! - Entity store lifecycle (create, update, delete, bounds resolution)
//! - Entity defaults (UV transform, color, static flag)
//! - Procedural primitives producing the fixed vertex layout
//! - Asset cache request dedupe and status transitions

use glam::{Vec3, Vec4};

use umbra::assets::{AssetCache, AssetStatus, LoadRequest};
use umbra::resources::geometry::VERTEX_FLOATS;
use umbra::resources::primitives::{box_mesh, plane_mesh, sphere_mesh, sprite_quad};
use umbra::resources::BoundingSphere;
use umbra::scene::entity::{EntityDesc, EntityStore};

// ============================================================================
// Entity store
// ============================================================================

#[test]
fn create_applies_defaults() {
    let mut store = EntityStore::new();
    let id = store.create(EntityDesc {
        position: Vec3::new(1.0, 2.0, 3.0),
        ..EntityDesc::default()
    });
    let entity = store.get(id).expect("entity exists");
    assert_eq!(entity.uv_transform, Vec4::new(0.0, 0.0, 1.0, 1.0));
    assert_eq!(entity.color, Vec4::ONE);
    assert_eq!(entity.scale, Vec3::ONE);
    assert!(!entity.is_static);
}

#[test]
fn update_mutates_only_the_target() {
    let mut store = EntityStore::new();
    let a = store.create(EntityDesc::default());
    let b = store.create(EntityDesc::default());
    store.update(a, |e| e.position = Vec3::new(9.0, 0.0, 0.0));
    assert_eq!(store.get(a).unwrap().position.x, 9.0);
    assert_eq!(store.get(b).unwrap().position.x, 0.0);
}

#[test]
fn delete_removes_and_reports() {
    let mut store = EntityStore::new();
    let id = store.create(EntityDesc::default());
    assert!(store.delete(id));
    assert!(store.get(id).is_none());
    assert!(!store.delete(id), "Double delete reports false");
}

#[test]
fn resolve_bounds_targets_matching_models_only() {
    let mut store = EntityStore::new();
    let with_model = store.create(EntityDesc {
        model: Some("tree".to_string()),
        ..EntityDesc::default()
    });
    let other = store.create(EntityDesc {
        model: Some("rock".to_string()),
        ..EntityDesc::default()
    });

    let sphere = BoundingSphere {
        center: Vec3::new(0.0, 2.0, 0.0),
        radius: 3.0,
    };
    store.resolve_bounds("tree", sphere);
    assert_eq!(store.get(with_model).unwrap().bounding_sphere.radius, 3.0);
    assert_eq!(
        store.get(other).unwrap().bounding_sphere.radius,
        BoundingSphere::default().radius
    );
}

#[test]
fn world_matrix_composes_srt() {
    let mut store = EntityStore::new();
    let id = store.create(EntityDesc {
        position: Vec3::new(0.0, 5.0, 0.0),
        scale: Some(Vec3::splat(2.0)),
        ..EntityDesc::default()
    });
    let world = store.get(id).unwrap().world_matrix();
    let p = world.transform_point3(Vec3::new(1.0, 0.0, 0.0));
    assert!((p - Vec3::new(2.0, 5.0, 0.0)).length() < 1e-5);
}

// ============================================================================
// Primitives
// ============================================================================

#[test]
fn box_mesh_has_24_vertices_36_indices() {
    let mesh = box_mesh(1.0, 1.0, 1.0);
    assert_eq!(mesh.vertex_count(), 24);
    assert_eq!(mesh.indices.len(), 36);
    assert_eq!(mesh.vertices.len() % VERTEX_FLOATS, 0);
}

#[test]
fn plane_mesh_is_one_quad() {
    let mesh = plane_mesh(2.0, 2.0);
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.indices.len(), 6);
}

#[test]
fn sphere_mesh_indices_stay_in_range() {
    let mesh = sphere_mesh(1.0, 12, 8);
    let count = mesh.vertex_count() as u32;
    assert!(mesh.indices.iter().all(|&i| i < count));
}

#[test]
fn unit_box_bounding_sphere_radius() {
    let mesh = box_mesh(1.0, 1.0, 1.0);
    let sphere = BoundingSphere::from_vertices(&mesh.vertices);
    // Corner distance of a unit cube.
    let expected = (0.75f32).sqrt();
    assert!(
        (sphere.radius - expected).abs() < 1e-4,
        "Expected {expected}, got {}",
        sphere.radius
    );
    assert!(sphere.center.length() < 1e-4);
}

#[test]
fn sprite_quad_anchors_at_bottom_edge() {
    let mesh = sprite_quad();
    let min_y = (0..mesh.vertex_count())
        .map(|i| mesh.vertices[i * VERTEX_FLOATS + 1])
        .fold(f32::MAX, f32::min);
    assert_eq!(min_y, 0.0, "Billboard pivot sits at the anchor");
}

// ============================================================================
// Asset cache bookkeeping (no GPU: request/dedupe paths only)
// ============================================================================

#[test]
fn first_request_starts_later_requests_join() {
    let cache = AssetCache::new();
    assert_eq!(cache.request("models/tree.glb"), LoadRequest::Start);
    assert_eq!(cache.request("models/tree.glb"), LoadRequest::Joined);
    assert_eq!(
        cache.request("models/tree.glb|trunk"),
        LoadRequest::Joined,
        "A primitive key joins its model's pending load"
    );
    assert_eq!(cache.status("models/tree.glb"), AssetStatus::Pending);
}

#[test]
fn unknown_assets_report_unloaded() {
    let cache = AssetCache::new();
    assert_eq!(cache.status("nope"), AssetStatus::Unloaded);
    assert!(cache.get("nope").is_none());
    assert!(cache.error("nope").is_none());
}
