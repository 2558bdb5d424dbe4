#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

pub mod assets;
pub mod engine;
pub mod errors;
pub mod gpu;
pub mod render;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;

pub use assets::{AssetCache, AssetKey, MeshSource, ModelData};
pub use engine::{Engine, EngineState};
pub use errors::{Result, UmbraError};
pub use gpu::GpuContext;
pub use render::RenderGraph;
pub use resources::primitives::*;
pub use resources::{
    AlphaMode, BoundingSphere, Geometry, Material, Skin, INSTANCE_STRIDE, VERTEX_STRIDE,
};
pub use scene::{BillboardMode, Camera, Entity, EntityId, EntityStore, LightDesc, LightKind};
pub use settings::Settings;
