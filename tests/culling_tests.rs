//! Culling Tests
//!
//! Tests for:
//! - Visible count never exceeding the entity count
//! - Everything in frustum visible with all optional tests disabled
//! - Distance, projected-size and frustum rejection
//! - Distance fade factor bounds
//! - HiZ occlusion against a synthetic depth-tile snapshot
//! - Camera-motion invalidation warmup
//! - Grouping of same-model entities into one batch group

use glam::{Vec2, Vec3};

use umbra::assets::AssetCache;
use umbra::render::culling::{cull, CullInput, HiZSnapshot, OcclusionWarmup};
use umbra::scene::camera::Camera;
use umbra::scene::entity::{EntityDesc, EntityStore};
use umbra::settings::{CullingPassSettings, OcclusionCullingSettings, Settings};

fn camera_at_origin() -> umbra::scene::RenderCamera {
    let mut cam = Camera::new(70.0, 0.05, 5000.0);
    cam.extract(1.0, Vec2::ZERO)
}

fn permissive_config() -> CullingPassSettings {
    CullingPassSettings {
        frustum: false,
        hi_z: false,
        cascade_filter: false,
        max_distance: 100_000.0,
        max_skinned: 0,
        min_pixel_size: 0.0,
        fade_start: 0.8,
    }
}

fn entity_at(store: &mut EntityStore, position: Vec3, model: &str) {
    store.create(EntityDesc {
        position,
        model: Some(model.to_string()),
        ..EntityDesc::default()
    });
}

fn run_cull(
    store: &EntityStore,
    config: &CullingPassSettings,
    occlusion: &OcclusionCullingSettings,
    hi_z: Option<&HiZSnapshot>,
) -> umbra::render::culling::CullResults {
    let camera = camera_at_origin();
    let assets = AssetCache::new();
    cull(&CullInput {
        entities: store,
        assets: &assets,
        camera: &camera,
        config,
        occlusion,
        frustum_enabled: true,
        hi_z,
        screen_height: 1080,
        phase_buckets: 8,
    })
}

// ============================================================================
// Counting invariants
// ============================================================================

#[test]
fn visible_never_exceeds_entity_count() {
    let mut store = EntityStore::new();
    for i in 0..20 {
        entity_at(&mut store, Vec3::new(i as f32 * 3.0, 0.0, -10.0), "m");
    }
    let results = run_cull(
        &store,
        &CullingPassSettings::default(),
        &OcclusionCullingSettings::default(),
        None,
    );
    assert!(results.visible <= store.len());
}

#[test]
fn all_visible_when_tests_disabled() {
    let mut store = EntityStore::new();
    for i in 0..8 {
        entity_at(&mut store, Vec3::new(0.0, 0.0, -5.0 - i as f32), "m");
    }
    let results = run_cull(
        &store,
        &permissive_config(),
        &OcclusionCullingSettings::default(),
        None,
    );
    assert_eq!(
        results.visible,
        store.len(),
        "With every optional test off and all entities in front, everything survives"
    );
}

#[test]
fn entities_without_models_are_ignored() {
    let mut store = EntityStore::new();
    store.create(EntityDesc::default());
    let results = run_cull(
        &store,
        &permissive_config(),
        &OcclusionCullingSettings::default(),
        None,
    );
    assert_eq!(results.tested, 0);
    assert_eq!(results.visible, 0);
}

// ============================================================================
// Individual tests
// ============================================================================

#[test]
fn distance_test_rejects_far_entities() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, -500.0), "m");
    let config = CullingPassSettings {
        max_distance: 100.0,
        ..permissive_config()
    };
    let results = run_cull(&store, &config, &OcclusionCullingSettings::default(), None);
    assert_eq!(results.visible, 0);
}

#[test]
fn distance_fade_is_one_below_start_and_falls_linearly() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, -10.0), "near");
    entity_at(&mut store, Vec3::new(0.0, 0.0, -90.0), "far");
    let config = CullingPassSettings {
        max_distance: 100.0,
        fade_start: 0.5,
        ..permissive_config()
    };
    let results = run_cull(&store, &config, &OcclusionCullingSettings::default(), None);

    let near = results
        .groups
        .iter()
        .find(|(k, _)| k.model == "near")
        .map(|(_, v)| &v[0])
        .expect("near entity visible");
    assert!((near.fade - 1.0).abs() < 1e-5, "Below fade start the factor is 1");

    let far = results
        .groups
        .iter()
        .find(|(k, _)| k.model == "far")
        .map(|(_, v)| &v[0])
        .expect("far entity visible");
    assert!(
        far.fade > 0.0 && far.fade < 1.0,
        "Past fade start the factor falls into (0, 1), got {}",
        far.fade
    );
    // The fade rides in the instance color alpha.
    assert!((far.color.w - far.fade).abs() < 1e-5);
}

#[test]
fn min_pixel_size_rejects_tiny_entities() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, -900.0), "m");
    let config = CullingPassSettings {
        min_pixel_size: 5.0,
        ..permissive_config()
    };
    // Default bounding sphere radius 0.5 at 900 m projects well below 5 px.
    let results = run_cull(&store, &config, &OcclusionCullingSettings::default(), None);
    assert_eq!(results.visible, 0);
}

#[test]
fn frustum_rejects_entities_behind_camera() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, 50.0), "m");
    let config = CullingPassSettings {
        frustum: true,
        ..permissive_config()
    };
    let results = run_cull(&store, &config, &OcclusionCullingSettings::default(), None);
    assert_eq!(results.visible, 0);
}

#[test]
fn degenerate_camera_yields_empty_set() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, -5.0), "m");
    let mut cam = Camera::new(70.0, 0.05, 5000.0);
    cam.position = Vec3::new(f32::NAN, 0.0, 0.0);
    let camera = cam.extract(1.0, Vec2::ZERO);
    let assets = AssetCache::new();
    let results = cull(&CullInput {
        entities: &store,
        assets: &assets,
        camera: &camera,
        config: &permissive_config(),
        occlusion: &OcclusionCullingSettings::default(),
        frustum_enabled: true,
        hi_z: None,
        screen_height: 1080,
        phase_buckets: 8,
    });
    assert_eq!(results.visible, 0, "NaN camera must produce an empty set, not a panic");
}

// ============================================================================
// HiZ occlusion
// ============================================================================

fn uniform_snapshot(tiles_x: u32, tiles_y: u32, min_depth: f32, max_depth: f32) -> HiZSnapshot {
    let mut data = Vec::new();
    for _ in 0..tiles_x * tiles_y {
        data.push(min_depth);
        data.push(max_depth);
    }
    HiZSnapshot {
        tiles_x,
        tiles_y,
        data,
    }
}

#[test]
fn hiz_occludes_entity_behind_depth_tiles() {
    let mut store = EntityStore::new();
    // Far entity, well behind an occluder layer at depth ~0.1.
    entity_at(&mut store, Vec3::new(0.0, 0.0, -4000.0), "m");
    let config = CullingPassSettings {
        hi_z: true,
        ..permissive_config()
    };
    // 1080 / 64 tiles vertically, 1080 wide at aspect 1.
    let snapshot = uniform_snapshot(17, 17, 0.1, 0.2);
    let results = run_cull(
        &store,
        &config,
        &OcclusionCullingSettings::default(),
        Some(&snapshot),
    );
    assert_eq!(results.visible, 0, "Entity far behind tile depth must be occluded");
}

#[test]
fn hiz_keeps_entity_in_front_of_depth_tiles() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(0.0, 0.0, -10.0), "m");
    let config = CullingPassSettings {
        hi_z: true,
        ..permissive_config()
    };
    // Occluders near the far plane: nothing in front is hidden.
    let snapshot = uniform_snapshot(17, 17, 0.95, 1.0);
    let results = run_cull(
        &store,
        &config,
        &OcclusionCullingSettings::default(),
        Some(&snapshot),
    );
    assert_eq!(results.visible, 1);
}

#[test]
fn hiz_wide_spans_are_accepted_without_testing() {
    let mut store = EntityStore::new();
    // Huge sphere close to the camera spans more tiles than the cap.
    store.create(EntityDesc {
        position: Vec3::new(0.0, 0.0, -20.0),
        scale: Some(Vec3::splat(200.0)),
        model: Some("m".to_string()),
        ..EntityDesc::default()
    });
    let config = CullingPassSettings {
        hi_z: true,
        ..permissive_config()
    };
    let snapshot = uniform_snapshot(17, 17, 0.0, 0.0);
    let results = run_cull(
        &store,
        &config,
        &OcclusionCullingSettings::default(),
        Some(&snapshot),
    );
    assert_eq!(results.visible, 1, "Spans wider than max_tile_span skip the test");
}

// ============================================================================
// Camera-motion warmup
// ============================================================================

#[test]
fn teleport_invalidates_occlusion_for_warmup_frames() {
    let settings = Settings::default();
    let mut warmup = OcclusionWarmup::new();
    let mut cam = Camera::new(70.0, 0.05, 5000.0);

    let rc = cam.extract(1.0, Vec2::ZERO);
    assert!(!warmup.update(&rc, &settings.occlusion_culling), "First frame has no motion");

    // 100 m teleport between frames.
    cam.position = Vec3::new(100.0, 0.0, 0.0);
    let rc = cam.extract(1.0, Vec2::ZERO);
    let mut skipped = 0;
    for _ in 0..settings.occlusion_culling.warmup_frames {
        if warmup.update(&rc, &settings.occlusion_culling) {
            skipped += 1;
        }
    }
    assert_eq!(
        skipped, settings.occlusion_culling.warmup_frames as usize,
        "Every warmup frame after a teleport skips the occlusion test"
    );
    assert!(
        !warmup.update(&rc, &settings.occlusion_culling),
        "After the warmup the test resumes"
    );
}

#[test]
fn explicit_invalidate_forces_warmup() {
    let settings = Settings::default();
    let mut warmup = OcclusionWarmup::new();
    let mut cam = Camera::new(70.0, 0.05, 5000.0);
    let rc = cam.extract(1.0, Vec2::ZERO);
    warmup.update(&rc, &settings.occlusion_culling);

    warmup.invalidate(2);
    assert!(warmup.update(&rc, &settings.occlusion_culling));
    assert!(warmup.update(&rc, &settings.occlusion_culling));
    assert!(!warmup.update(&rc, &settings.occlusion_culling));
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn same_model_entities_share_one_group() {
    let mut store = EntityStore::new();
    entity_at(&mut store, Vec3::new(5.0, 0.0, -10.0), "shared");
    entity_at(&mut store, Vec3::new(-5.0, 0.0, -10.0), "shared");
    let results = run_cull(
        &store,
        &permissive_config(),
        &OcclusionCullingSettings::default(),
        None,
    );
    assert_eq!(results.groups.len(), 1, "One model, one group");
    let entries = results.groups.values().next().unwrap();
    assert_eq!(entries.len(), 2);
    // Entries are sorted nearest first.
    assert!(entries[0].distance <= entries[1].distance);
}
