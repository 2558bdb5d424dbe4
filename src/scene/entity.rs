//! Entity records and the flat entity store.

use glam::{Mat4, Quat, Vec3, Vec4};
use slotmap::SlotMap;

use crate::resources::BoundingSphere;

slotmap::new_key_type! {
    /// Stable handle to an entity record.
    pub struct EntityId;
}

/// Light kind attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// Analytic light description on an entity.
#[derive(Debug, Clone)]
pub struct LightDesc {
    pub kind: LightKind,
    /// RGB color; alpha carries intensity.
    pub color: Vec4,
    /// Offset from the entity position.
    pub offset: Vec3,
    /// Spot direction; ignored for point lights.
    pub direction: Vec3,
    pub radius: f32,
    /// Cosine of the inner cone half-angle.
    pub inner_cone: f32,
    /// Cosine of the outer cone half-angle.
    pub outer_cone: f32,
    pub enabled: bool,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            offset: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            radius: 10.0,
            inner_cone: 0.95,
            outer_cone: 0.85,
            enabled: true,
        }
    }
}

/// How the mesh orients itself toward the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillboardMode {
    #[default]
    None,
    /// Camera-facing quad centered on the entity.
    Center,
    /// Camera-facing quad pivoting at the anchor point.
    Bottom,
    /// Quad lying in the XZ plane.
    Horizontal,
}

impl BillboardMode {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            BillboardMode::None => 0,
            BillboardMode::Center => 1,
            BillboardMode::Bottom => 2,
            BillboardMode::Horizontal => 3,
        }
    }
}

/// Animation playback requested on a skinned entity.
#[derive(Debug, Clone)]
pub struct AnimationState {
    pub clip: String,
    pub time_offset: f32,
    pub speed: f32,
}

/// One scene entity.
///
/// The engine never mutates entity state; every field is host-driven through
/// the store API. The local bounding sphere is resolved from the referenced
/// asset when it becomes ready.
#[derive(Debug, Clone)]
pub struct Entity {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// `"path"` or `"path|mesh"` into the asset cache, or `None`.
    pub model: Option<String>,
    /// Local-space bounding sphere from the asset.
    pub bounding_sphere: BoundingSphere,
    pub light: Option<LightDesc>,
    /// UV offset.xy + scale.xy.
    pub uv_transform: Vec4,
    pub color: Vec4,
    /// Static instances skip the per-frame pixel-rounding reset.
    pub is_static: bool,
    pub billboard: BillboardMode,
    pub animation: Option<AnimationState>,
}

impl Entity {
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Creation parameters for [`EntityStore::create`].
#[derive(Debug, Clone, Default)]
pub struct EntityDesc {
    pub position: Vec3,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub model: Option<String>,
    pub light: Option<LightDesc>,
    pub uv_transform: Option<Vec4>,
    pub color: Option<Vec4>,
    pub is_static: bool,
    pub billboard: BillboardMode,
    pub animation: Option<AnimationState>,
}

/// Flat id-to-record map over all live entities.
#[derive(Default)]
pub struct EntityStore {
    entities: SlotMap<EntityId, Entity>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, desc: EntityDesc) -> EntityId {
        self.entities.insert(Entity {
            position: desc.position,
            rotation: desc.rotation.unwrap_or(Quat::IDENTITY),
            scale: desc.scale.unwrap_or(Vec3::ONE),
            model: desc.model,
            bounding_sphere: BoundingSphere::default(),
            light: desc.light,
            uv_transform: desc.uv_transform.unwrap_or(Vec4::new(0.0, 0.0, 1.0, 1.0)),
            color: desc.color.unwrap_or(Vec4::ONE),
            is_static: desc.is_static,
            billboard: desc.billboard,
            animation: desc.animation,
        })
    }

    /// Applies a host mutation to one entity. Unknown ids are ignored.
    pub fn update(&mut self, id: EntityId, mutate: impl FnOnce(&mut Entity)) {
        if let Some(entity) = self.entities.get_mut(id) {
            mutate(entity);
        }
    }

    pub fn delete(&mut self, id: EntityId) -> bool {
        self.entities.remove(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Writes the asset's local bounding sphere into every entity that
    /// references `model`. Called by the engine when a load completes.
    pub fn resolve_bounds(&mut self, model: &str, sphere: BoundingSphere) {
        for (_, entity) in self.entities.iter_mut() {
            if entity.model.as_deref() == Some(model) {
                entity.bounding_sphere = sphere;
            }
        }
    }
}
