//! Skin and Animation Tests
//!
//! Tests for:
//! - Keyframe sampling (step and linear, time wrapping)
//! - Rest pose fallback for missing clips
//! - Joint hierarchy world propagation and skinning matrices
//! - Bounding union invariant for mixed skinned/rigid models

use glam::{Mat4, Quat, Vec3, Vec4Swizzles};
use rustc_hash::FxHashMap;

use umbra::resources::geometry::BoundingSphere;
use umbra::resources::skin::{
    AnimSampler, AnimationClip, Channel, ChannelPath, Interpolation, JointNode, Skin,
};

const EPSILON: f32 = 1e-4;

fn joint(name: &str, parent: Option<usize>, translation: Vec3) -> JointNode {
    JointNode {
        name: name.to_string(),
        parent,
        translation,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    }
}

fn two_bone_skin() -> Skin {
    let mut animations = FxHashMap::default();
    animations.insert(
        "walk".to_string(),
        AnimationClip {
            duration: 2.0,
            channels: vec![Channel {
                target: 1,
                path: ChannelPath::Translation,
                sampler: AnimSampler {
                    times: vec![0.0, 1.0, 2.0],
                    values: vec![
                        0.0, 1.0, 0.0, // t=0
                        0.0, 2.0, 0.0, // t=1
                        0.0, 1.0, 0.0, // t=2
                    ],
                    interpolation: Interpolation::Linear,
                },
            }],
        },
    );
    Skin {
        joints: vec![
            joint("root", None, Vec3::ZERO),
            joint("arm", Some(0), Vec3::new(0.0, 1.0, 0.0)),
        ],
        inverse_bind: vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))],
        animations,
    }
}

// ============================================================================
// Sampling
// ============================================================================

#[test]
fn sample_interpolates_linearly_between_keys() {
    let skin = two_bone_skin();
    let pose = skin.sample("walk", 0.5);
    assert!(
        (pose[1].translation.y - 1.5).abs() < EPSILON,
        "Halfway between keys 1.0 and 2.0, got {}",
        pose[1].translation.y
    );
}

#[test]
fn sample_wraps_time_by_clip_duration() {
    let skin = two_bone_skin();
    let wrapped = skin.sample("walk", 2.5);
    let direct = skin.sample("walk", 0.5);
    assert!(
        (wrapped[1].translation.y - direct[1].translation.y).abs() < EPSILON,
        "t=2.5 on a 2 s clip equals t=0.5"
    );
}

#[test]
fn sample_clamps_before_first_key() {
    let skin = two_bone_skin();
    let pose = skin.sample("walk", 0.0);
    assert!((pose[1].translation.y - 1.0).abs() < EPSILON);
}

#[test]
fn missing_clip_yields_rest_pose() {
    let skin = two_bone_skin();
    let pose = skin.sample("no_such_clip", 0.3);
    assert!((pose[1].translation.y - 1.0).abs() < EPSILON, "Rest translation survives");
    assert!((pose[0].translation.length()) < EPSILON);
}

#[test]
fn step_interpolation_holds_left_key() {
    let mut skin = two_bone_skin();
    if let Some(clip) = skin.animations.get_mut("walk") {
        clip.channels[0].sampler.interpolation = Interpolation::Step;
    }
    let pose = skin.sample("walk", 0.9);
    assert!(
        (pose[1].translation.y - 1.0).abs() < EPSILON,
        "Step sampling holds the previous key, got {}",
        pose[1].translation.y
    );
}

// ============================================================================
// Skinning matrices
// ============================================================================

#[test]
fn skinning_matrices_compose_parent_chain() {
    let skin = two_bone_skin();
    let pose = skin.rest_pose();
    let matrices = skin.skinning_matrices(&pose);
    assert_eq!(matrices.len(), 2);

    // Root: identity world, identity inverse bind.
    assert!((matrices[0] * Vec3::ZERO.extend(1.0)).xyz().length() < EPSILON);

    // Arm: world = translate(0,1,0), inverse bind = translate(0,-1,0);
    // a bind-pose vertex maps onto itself.
    let p = Vec3::new(0.3, 1.0, 0.0);
    let skinned = (matrices[1] * p.extend(1.0)).xyz();
    assert!(
        skinned.distance(p) < EPSILON,
        "Bind pose skinning is the identity, got {skinned:?}"
    );
}

#[test]
fn animated_joint_moves_skinned_vertex() {
    let skin = two_bone_skin();
    let pose = skin.sample("walk", 1.0);
    let matrices = skin.skinning_matrices(&pose);
    let p = Vec3::new(0.0, 1.0, 0.0);
    let skinned = (matrices[1] * p.extend(1.0)).xyz();
    assert!(
        (skinned.y - 2.0).abs() < EPSILON,
        "At t=1 the arm sits 1 m higher, got {skinned:?}"
    );
}

// ============================================================================
// Bounding sphere invariants
// ============================================================================

#[test]
fn union_contains_both_spheres() {
    let a = BoundingSphere {
        center: Vec3::ZERO,
        radius: 1.0,
    };
    let b = BoundingSphere {
        center: Vec3::new(4.0, 0.0, 0.0),
        radius: 0.5,
    };
    let u = a.union(&b);
    assert!(u.center.distance(a.center) + a.radius <= u.radius + EPSILON);
    assert!(u.center.distance(b.center) + b.radius <= u.radius + EPSILON);
}

#[test]
fn union_with_contained_sphere_is_identity() {
    let a = BoundingSphere {
        center: Vec3::ZERO,
        radius: 5.0,
    };
    let b = BoundingSphere {
        center: Vec3::new(1.0, 0.0, 0.0),
        radius: 0.5,
    };
    let u = a.union(&b);
    assert!((u.radius - 5.0).abs() < EPSILON);
    assert!(u.center.distance(Vec3::ZERO) < EPSILON);
}

#[test]
fn transform_scales_radius_by_largest_column() {
    let sphere = BoundingSphere {
        center: Vec3::ZERO,
        radius: 1.0,
    };
    let world = Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0));
    let transformed = sphere.transform(&world);
    assert!(
        (transformed.radius - 3.0).abs() < EPSILON,
        "Non-uniform scale must stay conservative"
    );
}
