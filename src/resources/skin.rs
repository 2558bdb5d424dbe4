//! Skins: joint hierarchy, animation tracks and joint-matrix textures.
//!
//! A [`Skin`] holds the shared, immutable animation data of a model. Each
//! rendered instance that needs its own pose owns a [`SkinAnimator`], which
//! borrows the skin and owns two joint-matrix textures: the current frame
//! and the previous frame, the latter feeding motion vectors.
//!
//! The joint texture is `4 × joint_count` in `rgba32float`; row `j` holds
//! the four columns of joint `j`'s skinning matrix.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::gpu::GpuTexture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

/// Keyframe sampler: input times, flat output values, interpolation mode.
#[derive(Debug, Clone)]
pub struct AnimSampler {
    pub times: Vec<f32>,
    /// 3 floats per key for translation/scale, 4 for rotation.
    pub values: Vec<f32>,
    pub interpolation: Interpolation,
}

impl AnimSampler {
    /// Index of the keyframe at or before `time`, and the fraction toward
    /// the next key.
    fn locate(&self, time: f32) -> (usize, usize, f32) {
        let n = self.times.len();
        if n == 0 {
            return (0, 0, 0.0);
        }
        if time <= self.times[0] {
            return (0, 0, 0.0);
        }
        if time >= self.times[n - 1] {
            return (n - 1, n - 1, 0.0);
        }
        let next = self.times.partition_point(|&t| t <= time);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        let t = if span > 1e-8 {
            (time - self.times[prev]) / span
        } else {
            0.0
        };
        (prev, next, t)
    }

    fn sample_vec3(&self, time: f32) -> Vec3 {
        let (a, b, t) = self.locate(time);
        let va = Vec3::from_slice(&self.values[a * 3..]);
        match self.interpolation {
            Interpolation::Step => va,
            Interpolation::Linear => va.lerp(Vec3::from_slice(&self.values[b * 3..]), t),
        }
    }

    fn sample_quat(&self, time: f32) -> Quat {
        let (a, b, t) = self.locate(time);
        let qa = Quat::from_slice(&self.values[a * 4..]).normalize();
        match self.interpolation {
            Interpolation::Step => qa,
            Interpolation::Linear => {
                let qb = Quat::from_slice(&self.values[b * 4..]).normalize();
                qa.slerp(qb, t)
            }
        }
    }
}

/// One animated property of one joint.
#[derive(Debug, Clone)]
pub struct Channel {
    pub target: usize,
    pub path: ChannelPath,
    pub sampler: AnimSampler,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub duration: f32,
    pub channels: Vec<Channel>,
}

/// Arena node of the joint hierarchy. Parent indices always precede their
/// children in the joint list; `parent == None` marks a root.
#[derive(Debug, Clone)]
pub struct JointNode {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// Local TRS pose of one joint during sampling.
#[derive(Debug, Clone, Copy)]
pub struct JointPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl JointPose {
    fn lerp(&self, other: &JointPose, t: f32) -> JointPose {
        JointPose {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Crossfade from a previous clip into the current one.
#[derive(Debug, Clone)]
pub struct BlendState {
    pub from_clip: String,
    /// Playback position of the outgoing clip, frozen at crossfade start.
    pub from_time: f32,
    /// 0 = fully the outgoing clip, 1 = fully the incoming clip.
    pub weight: f32,
    pub duration: f32,
    pub elapsed: f32,
}

// ============================================================================
// Skin (shared animation data)
// ============================================================================

/// Immutable joint hierarchy + clips, shared between animator instances.
pub struct Skin {
    pub joints: Vec<JointNode>,
    pub inverse_bind: Vec<Mat4>,
    pub animations: FxHashMap<String, AnimationClip>,
}

impl Skin {
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[must_use]
    pub fn clip(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.get(name)
    }

    /// Rest pose of every joint.
    #[must_use]
    pub fn rest_pose(&self) -> Vec<JointPose> {
        self.joints
            .iter()
            .map(|j| JointPose {
                translation: j.translation,
                rotation: j.rotation,
                scale: j.scale,
            })
            .collect()
    }

    /// Samples `clip` at `time` (wrapped to the clip duration) into a local
    /// pose array. Joints without channels keep their rest pose.
    #[must_use]
    pub fn sample(&self, clip_name: &str, time: f32) -> Vec<JointPose> {
        let mut pose = self.rest_pose();
        let Some(clip) = self.animations.get(clip_name) else {
            return pose;
        };
        let t = if clip.duration > 1e-6 {
            time.rem_euclid(clip.duration)
        } else {
            0.0
        };
        for channel in &clip.channels {
            let Some(slot) = pose.get_mut(channel.target) else {
                continue;
            };
            match channel.path {
                ChannelPath::Translation => slot.translation = channel.sampler.sample_vec3(t),
                ChannelPath::Rotation => slot.rotation = channel.sampler.sample_quat(t),
                ChannelPath::Scale => slot.scale = channel.sampler.sample_vec3(t),
            }
        }
        pose
    }

    /// Skinning matrices (`joint_world × inverse_bind`) for a local pose.
    #[must_use]
    pub fn skinning_matrices(&self, pose: &[JointPose]) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.joints.len()];
        for (i, joint) in self.joints.iter().enumerate() {
            let local = pose
                .get(i)
                .map_or_else(|| Mat4::IDENTITY, JointPose::matrix);
            world[i] = match joint.parent {
                Some(p) => world[p] * local,
                None => local,
            };
        }
        world
            .iter()
            .zip(&self.inverse_bind)
            .map(|(w, ib)| *w * *ib)
            .collect()
    }
}

// ============================================================================
// SkinAnimator (per-instance playback + GPU textures)
// ============================================================================

/// Playback state plus the current/previous joint-matrix texture pair.
pub struct SkinAnimator {
    pub skin: Arc<Skin>,
    pub clip: Option<String>,
    pub time: f32,
    pub speed: f32,
    pub blend: Option<BlendState>,

    joint_texture: GpuTexture,
    prev_joint_texture: GpuTexture,
    matrices: Vec<Mat4>,
    prev_matrices: Vec<Mat4>,
}

impl SkinAnimator {
    #[must_use]
    pub fn new(device: &wgpu::Device, skin: Arc<Skin>) -> Self {
        let joints = skin.joint_count().max(1) as u32;
        let make = |label| {
            GpuTexture::new_2d(
                device,
                label,
                4,
                joints,
                wgpu::TextureFormat::Rgba32Float,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            )
        };
        let identity = vec![Mat4::IDENTITY; joints as usize];
        Self {
            skin,
            clip: None,
            time: 0.0,
            speed: 1.0,
            blend: None,
            joint_texture: make("Joint Matrix Texture"),
            prev_joint_texture: make("Prev Joint Matrix Texture"),
            matrices: identity.clone(),
            prev_matrices: identity,
        }
    }

    /// Switches clips immediately.
    pub fn play(&mut self, clip: &str) {
        self.clip = Some(clip.to_string());
        self.time = 0.0;
        self.blend = None;
    }

    /// Crossfades into `clip` over `duration` seconds.
    pub fn crossfade(&mut self, clip: &str, duration: f32) {
        if self.clip.as_deref() == Some(clip) {
            return;
        }
        if let Some(from) = self.clip.take() {
            self.blend = Some(BlendState {
                from_clip: from,
                from_time: self.time,
                weight: 0.0,
                duration: duration.max(1e-3),
                elapsed: 0.0,
            });
        }
        self.clip = Some(clip.to_string());
        self.time = 0.0;
    }

    /// Advances playback and recomputes skinning matrices.
    pub fn update(&mut self, dt: f32) {
        self.prev_matrices.clone_from(&self.matrices);
        self.time += dt * self.speed;

        if let Some(blend) = &mut self.blend {
            blend.elapsed += dt;
            blend.weight = (blend.elapsed / blend.duration).clamp(0.0, 1.0);
            if blend.weight >= 1.0 {
                self.blend = None;
            }
        }

        let Some(clip) = self.clip.clone() else {
            return;
        };
        let mut pose = self.skin.sample(&clip, self.time);
        if let Some(blend) = &self.blend {
            let from_pose = self.skin.sample(&blend.from_clip, blend.from_time);
            for (slot, from) in pose.iter_mut().zip(&from_pose) {
                *slot = from.lerp(slot, blend.weight);
            }
        }
        let matrices = self.skin.skinning_matrices(&pose);
        if !matrices.is_empty() {
            self.matrices = matrices;
        }
    }

    /// Uploads both joint textures for this frame.
    pub fn upload(&self, queue: &wgpu::Queue) {
        write_matrix_texture(queue, &self.joint_texture, &self.matrices);
        write_matrix_texture(queue, &self.prev_joint_texture, &self.prev_matrices);
    }

    #[must_use]
    pub fn texture(&self) -> &GpuTexture {
        &self.joint_texture
    }

    #[must_use]
    pub fn prev_texture(&self) -> &GpuTexture {
        &self.prev_joint_texture
    }
}

fn write_matrix_texture(queue: &wgpu::Queue, texture: &GpuTexture, matrices: &[Mat4]) {
    if matrices.is_empty() {
        return;
    }
    let mut data = Vec::with_capacity(matrices.len() * 16);
    for m in matrices {
        data.extend_from_slice(&m.to_cols_array());
    }
    queue.write_texture(
        texture.texture.as_image_copy(),
        bytemuck::cast_slice(&data),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(64),
            rows_per_image: Some(matrices.len() as u32),
        },
        wgpu::Extent3d {
            width: 4,
            height: matrices.len() as u32,
            depth_or_array_layers: 1,
        },
    );
}
