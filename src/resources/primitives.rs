//! Procedural primitive meshes in the engine vertex layout.
//!
//! Used by hosts for blockout scenes and by tests for predictable geometry.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use super::geometry::MeshData;

fn push_vertex(out: &mut Vec<f32>, position: Vec3, uv: Vec2, normal: Vec3) {
    out.extend_from_slice(&position.to_array());
    out.extend_from_slice(&uv.to_array());
    out.extend_from_slice(&normal.to_array());
    // color
    out.extend_from_slice(&[1.0, 1.0, 1.0, 1.0]);
    // skin weights + joints (rigid)
    out.extend_from_slice(&[0.0; 4]);
    out.extend_from_slice(&[0.0; 4]);
}

/// Axis-aligned box centered at the origin.
#[must_use]
pub fn box_mesh(width: f32, height: f32, depth: f32) -> MeshData {
    let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let half = Vec3::new(hx, hy, hz);
    let mut mesh = MeshData::default();
    for (i, (normal, up, right)) in faces.iter().enumerate() {
        let base = (i * 4) as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = (*normal + *right * su + *up * sv) * half;
            let uv = Vec2::new((su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5);
            push_vertex(&mut mesh.vertices, corner, uv, *normal);
        }
        mesh.indices
            .extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
    }
    mesh
}

/// Unit-friendly UV sphere.
#[must_use]
pub fn sphere_mesh(radius: f32, segments: u32, rings: u32) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut mesh = MeshData::default();

    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let phi = v * PI;
        for seg in 0..=segments {
            let u = seg as f32 / segments as f32;
            let theta = u * PI * 2.0;
            let normal = Vec3::new(
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            );
            push_vertex(&mut mesh.vertices, normal * radius, Vec2::new(u, v), normal);
        }
    }

    let stride = segments + 1;
    for ring in 0..rings {
        for seg in 0..segments {
            let a = ring * stride + seg;
            let b = a + stride;
            mesh.indices
                .extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }
    mesh
}

/// XZ-plane quad facing +Y, centered at the origin.
#[must_use]
pub fn plane_mesh(width: f32, depth: f32) -> MeshData {
    let (hx, hz) = (width * 0.5, depth * 0.5);
    let mut mesh = MeshData::default();
    let corners = [
        (Vec3::new(-hx, 0.0, -hz), Vec2::new(0.0, 0.0)),
        (Vec3::new(hx, 0.0, -hz), Vec2::new(1.0, 0.0)),
        (Vec3::new(hx, 0.0, hz), Vec2::new(1.0, 1.0)),
        (Vec3::new(-hx, 0.0, hz), Vec2::new(0.0, 1.0)),
    ];
    for (pos, uv) in corners {
        push_vertex(&mut mesh.vertices, pos, uv, Vec3::Y);
    }
    mesh.indices.extend_from_slice(&[0, 2, 1, 0, 3, 2]);
    mesh
}

/// Camera-facing unit quad in the XY plane, anchored at its bottom edge.
/// Pairs with the billboard modes in the geometry shader.
#[must_use]
pub fn sprite_quad() -> MeshData {
    let mut mesh = MeshData::default();
    let corners = [
        (Vec3::new(-0.5, 0.0, 0.0), Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, 0.0, 0.0), Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, 1.0, 0.0), Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, 1.0, 0.0), Vec2::new(0.0, 0.0)),
    ];
    for (pos, uv) in corners {
        push_vertex(&mut mesh.vertices, pos, uv, Vec3::Z);
    }
    mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
    mesh
}
