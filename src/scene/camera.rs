//! Camera and frustum.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Stack-only camera snapshot handed to the render graph each frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderCamera {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    pub view_projection_matrix: Mat4,
    pub inverse_view: Mat4,
    pub inverse_projection: Mat4,
    /// Unjittered view-projection of the previous frame, for motion vectors.
    pub prev_view_projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub frustum: Frustum,
    pub near: f32,
    pub far: f32,
    pub fov_y: f32,
    /// Sub-pixel jitter in NDC units, zero when temporal jitter is off.
    pub jitter: Vec2,
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    prev_view_projection: Option<Mat4>,
}

impl Camera {
    #[must_use]
    pub fn new(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: fov_degrees.to_radians(),
            near,
            far,
            prev_view_projection: None,
        }
    }

    /// Orients the camera toward `target` with +Y up.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or(Vec3::NEG_Z);
        self.rotation = Quat::from_mat4(&Mat4::look_at_rh(self.position, self.position + forward, Vec3::Y).inverse());
    }

    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    #[must_use]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        // A degenerate near == far still yields a usable matrix for the
        // linear-depth write, which collapses to 0 in the shader.
        let far = if self.far <= self.near {
            self.near + 1e-3
        } else {
            self.far
        };
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-6), self.near, far)
    }

    /// Snapshots the camera for the frame. `jitter` is in NDC units and is
    /// baked into the projection; the frustum and the previous-frame matrix
    /// are built without it so culling and motion vectors stay stable.
    pub fn extract(&mut self, aspect: f32, jitter: Vec2) -> RenderCamera {
        let view = self.view_matrix();
        let proj = self.projection_matrix(aspect);
        let clean_view_proj = proj * view;

        let mut jittered = proj;
        jittered.z_axis.x += jitter.x;
        jittered.z_axis.y += jitter.y;

        let prev = self.prev_view_projection.unwrap_or(clean_view_proj);
        self.prev_view_projection = Some(clean_view_proj);

        RenderCamera {
            view_matrix: view,
            projection_matrix: jittered,
            view_projection_matrix: jittered * view,
            inverse_view: view.inverse(),
            inverse_projection: proj.inverse(),
            prev_view_projection: prev,
            position: self.position,
            forward: self.forward(),
            right: self.rotation * Vec3::X,
            up: self.rotation * Vec3::Y,
            frustum: Frustum::from_matrix(clean_view_proj),
            near: self.near,
            far: self.far,
            fov_y: self.fov_y,
            jitter,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(70.0, 0.05, 5000.0)
    }
}

// ============================================================================
// Frustum
// ============================================================================

/// Six normalized planes in `(normal, distance)` form, world space.
///
/// Plane order: left, right, bottom, top, near, far. The near plane passes
/// through the camera origin (the `w` row of the clip matrix) so everything
/// behind the camera is rejected conservatively.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann extraction from a view-projection matrix with a
    /// `[0, 1]` depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let row = |i: usize| m.row(i);
        let r0 = row(0);
        let r1 = row(1);
        let r2 = row(2);
        let r3 = row(3);

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3,      // near (camera plane)
            r3 - r2, // far
        ];
        for p in &mut planes {
            let len = p.xyz().length();
            if len > 1e-8 {
                *p /= len;
            }
        }
        Self { planes }
    }

    /// Signed distance from `point` to plane `i`; negative is outside.
    #[must_use]
    pub fn distance(&self, i: usize, point: Vec3) -> f32 {
        self.planes[i].xyz().dot(point) + self.planes[i].w
    }

    /// True when the sphere is at least partially inside all six planes.
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.xyz().dot(center) + p.w >= -radius)
    }

    /// True when the AABB's positive vertex is inside every plane.
    #[must_use]
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|p| {
            let n = p.xyz();
            let positive = Vec3::new(
                if n.x >= 0.0 { max.x } else { min.x },
                if n.y >= 0.0 { max.y } else { min.y },
                if n.z >= 0.0 { max.z } else { min.z },
            );
            n.dot(positive) + p.w >= 0.0
        })
    }
}
