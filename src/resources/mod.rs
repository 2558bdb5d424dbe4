//! Mesh, material and skin resources.

pub mod geometry;
pub mod material;
pub mod primitives;
pub mod skin;

pub use geometry::{
    BoundingSphere, Geometry, MeshData, INSTANCE_FLOATS, INSTANCE_STRIDE, VERTEX_FLOATS,
    VERTEX_STRIDE,
};
pub use material::{AlphaMode, Material, TextureData};
pub use skin::{
    AnimationClip, BlendState, Channel, ChannelPath, Interpolation, JointNode, Skin, SkinAnimator,
};
