//! Settings Tests
//!
//! Tests for:
//! - Default values of the typed configuration tree
//! - Deep merge of partial patches over the defaults
//! - Merge idempotence
//! - Rejection of unknown keys

use serde_json::json;

use umbra::settings::{deep_merge, Settings};

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn defaults_are_coherent() {
    let settings = Settings::default();
    assert_eq!(settings.shadow.cascade_count, 3);
    assert_eq!(
        settings.shadow.cascade_sizes.len(),
        settings.shadow.cascade_count as usize
    );
    assert_eq!(settings.shadow.max_spot_shadows, 16);
    assert_eq!(settings.lighting.max_lights_per_tile, 256);
    assert!(settings.camera.near < settings.camera.far);
    assert!(settings.culling.main.fade_start <= 1.0);
}

// ============================================================================
// Patching
// ============================================================================

#[test]
fn patch_overrides_nested_fields_only() {
    let patch = json!({
        "shadow": { "map_size": 4096 },
        "bloom": { "enabled": false }
    });
    let settings = Settings::from_patch(&patch).expect("patch applies");
    assert_eq!(settings.shadow.map_size, 4096);
    assert!(!settings.bloom.enabled);
    // Untouched siblings keep their defaults.
    assert_eq!(settings.shadow.cascade_count, 3);
    assert_eq!(settings.bloom.mip_levels, Settings::default().bloom.mip_levels);
}

#[test]
fn patch_replaces_arrays_wholesale() {
    let patch = json!({
        "shadow": { "cascade_sizes": [10.0, 40.0] , "cascade_count": 2 }
    });
    let settings = Settings::from_patch(&patch).expect("patch applies");
    assert_eq!(settings.shadow.cascade_sizes, vec![10.0, 40.0]);
    assert_eq!(settings.shadow.cascade_count, 2);
}

#[test]
fn unknown_keys_are_rejected() {
    let patch = json!({ "shadow": { "mapSize": 4096 } });
    assert!(
        Settings::from_patch(&patch).is_err(),
        "Misspelled keys must fail loudly, not vanish"
    );
}

#[test]
fn empty_patch_equals_defaults() {
    let settings = Settings::from_patch(&json!({})).expect("empty patch");
    let a = serde_json::to_value(&settings).unwrap();
    let b = serde_json::to_value(Settings::default()).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn deep_merge_is_idempotent() {
    let patch = json!({
        "ssgi": { "intensity": 0.4, "tile_size": 16 },
        "crt": { "enabled": true, "mask": "slot" }
    });
    let defaults = serde_json::to_value(Settings::default()).unwrap();

    let mut once = defaults.clone();
    deep_merge(&mut once, &patch);

    let mut twice = defaults;
    deep_merge(&mut twice, &patch);
    let mut twice_base = twice.clone();
    deep_merge(&mut twice_base, &patch);

    assert_eq!(once, twice_base, "merge(d, merge(d, x)) == merge(d, x)");
}

#[test]
fn from_patch_is_stable_under_reapplication() {
    let patch = json!({ "volumetric_fog": { "enabled": true, "density": 0.1 } });
    let settings = Settings::from_patch(&patch).expect("patch applies");
    let reserialized = serde_json::to_value(&settings).unwrap();
    let settings2 = Settings::from_patch(&patch).expect("patch applies twice");
    assert_eq!(reserialized, serde_json::to_value(&settings2).unwrap());
}
