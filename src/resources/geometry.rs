//! Geometry: vertex/index buffers and the fixed interleaved layouts.
//!
//! Every mesh in the engine uses one vertex format of 20 floats:
//! position(3), uv(2), normal(3), color(4), skin weights(4) and skin joint
//! indices(4, unsigned integers reinterpreted from the float array). The
//! per-instance format is 28 floats: model matrix(16), bounding sphere
//! center+radius(4), UV transform(4), instance color(4). Both strides are
//! part of the shader contract and must not drift.

use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::errors::{Result, UmbraError};

/// Floats per vertex.
pub const VERTEX_FLOATS: usize = 20;
/// Vertex stride in bytes.
pub const VERTEX_STRIDE: u64 = (VERTEX_FLOATS * 4) as u64;

/// Floats per instance.
pub const INSTANCE_FLOATS: usize = 28;
/// Instance stride in bytes.
pub const INSTANCE_STRIDE: u64 = (INSTANCE_FLOATS * 4) as u64;

/// Vertex buffer layout, shader locations 0..5.
#[must_use]
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x2, // uv
        2 => Float32x3, // normal
        3 => Float32x4, // color
        4 => Float32x4, // skin weights
        5 => Uint32x4,  // skin joints
    ];
    wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// Instance buffer layout, shader locations 6..12.
#[must_use]
pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        6  => Float32x4, // model matrix col 0
        7  => Float32x4, // model matrix col 1
        8  => Float32x4, // model matrix col 2
        9  => Float32x4, // model matrix col 3
        10 => Float32x4, // bounding sphere center + radius
        11 => Float32x4, // uv transform
        12 => Float32x4, // instance color
    ];
    wgpu::VertexBufferLayout {
        array_stride: INSTANCE_STRIDE,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRIBUTES,
    }
}

/// Appends one packed instance to `out`.
///
/// A negative radius tells the vertex shader to skip pixel rounding for
/// this instance (world-placed static meshes from the scene loader).
pub fn pack_instance(out: &mut Vec<f32>, world: &Mat4, sphere: Vec4, uv: Vec4, color: Vec4) {
    out.extend_from_slice(&world.to_cols_array());
    out.extend_from_slice(&sphere.to_array());
    out.extend_from_slice(&uv.to_array());
    out.extend_from_slice(&color.to_array());
}

// ============================================================================
// Bounding sphere
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 0.5,
        }
    }
}

impl BoundingSphere {
    /// Centroid-based sphere over the position stream of a 20-float
    /// interleaved vertex array.
    #[must_use]
    pub fn from_vertices(vertices: &[f32]) -> Self {
        let count = vertices.len() / VERTEX_FLOATS;
        if count == 0 {
            return Self::default();
        }
        let mut center = Vec3::ZERO;
        for i in 0..count {
            center += Vec3::from_slice(&vertices[i * VERTEX_FLOATS..]);
        }
        center /= count as f32;
        let mut radius_sq = 0.0f32;
        for i in 0..count {
            let p = Vec3::from_slice(&vertices[i * VERTEX_FLOATS..]);
            radius_sq = radius_sq.max(center.distance_squared(p));
        }
        Self {
            center,
            radius: radius_sq.sqrt(),
        }
    }

    /// Smallest sphere containing both inputs.
    #[must_use]
    pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
        let offset = other.center - self.center;
        let distance = offset.length();
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = if distance > 1e-8 {
            self.center + offset * ((radius - self.radius) / distance)
        } else {
            self.center
        };
        BoundingSphere { center, radius }
    }

    /// Sphere transformed by a world matrix; the radius scales by the
    /// largest column magnitude so non-uniform scale stays conservative.
    #[must_use]
    pub fn transform(&self, world: &Mat4) -> BoundingSphere {
        let scale = world
            .x_axis
            .truncate()
            .length()
            .max(world.y_axis.truncate().length())
            .max(world.z_axis.truncate().length());
        BoundingSphere {
            center: world.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

// ============================================================================
// CPU mesh data and GPU geometry
// ============================================================================

/// CPU-side interleaved mesh arrays, the unit the asset cache works with.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_FLOATS
    }
}

/// Vertex/index buffer pair with a local bounding sphere.
pub struct Geometry {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub index_count: u32,
    pub bounding_sphere: BoundingSphere,
}

impl Geometry {
    /// Uploads interleaved vertex data and a u32 index array.
    pub fn new(device: &wgpu::Device, label: &str, data: &MeshData) -> Result<Self> {
        if data.vertices.len() % VERTEX_FLOATS != 0 {
            return Err(UmbraError::InvalidMeshData {
                path: label.to_string(),
                reason: format!(
                    "vertex array length {} is not a multiple of {VERTEX_FLOATS}",
                    data.vertices.len()
                ),
            });
        }
        let vertex_count = (data.vertices.len() / VERTEX_FLOATS) as u32;
        if let Some(&bad) = data.indices.iter().find(|&&i| i >= vertex_count.max(1)) {
            return Err(UmbraError::InvalidMeshData {
                path: label.to_string(),
                reason: format!("index {bad} out of range for {vertex_count} vertices"),
            });
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count,
            index_count: data.indices.len() as u32,
            bounding_sphere: BoundingSphere::from_vertices(&data.vertices),
        })
    }

    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}
