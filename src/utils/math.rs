//! Small math helpers shared by the culling, shadow and post passes.
//!
//! These mirror the WGSL-side functions bit for bit where a contract spans
//! the CPU/GPU boundary (octahedral encoding, squircle distance), so the
//! CPU tests double as references for the shader code.

use glam::{Vec2, Vec3};

/// Rounds `value` up to the next multiple of `alignment`.
#[must_use]
pub fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Rounds a capacity up to the next power of two.
#[must_use]
pub fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

// ============================================================================
// Octahedral direction encoding
// ============================================================================

fn oct_wrap(v: Vec2) -> Vec2 {
    let sign = Vec2::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    );
    (Vec2::ONE - Vec2::new(v.y.abs(), v.x.abs())) * sign
}

/// Encodes a unit direction into the octahedral square `[0, 1]²`.
///
/// Used by the environment sampler when the environment texture carries an
/// octahedral map instead of an equirectangular one.
#[must_use]
pub fn encode_octahedral(dir: Vec3) -> Vec2 {
    let n = dir / (dir.x.abs() + dir.y.abs() + dir.z.abs());
    let p = if n.z >= 0.0 {
        Vec2::new(n.x, n.y)
    } else {
        oct_wrap(Vec2::new(n.x, n.y))
    };
    p * 0.5 + Vec2::splat(0.5)
}

/// Decodes an octahedral-encoded direction back to a unit vector.
#[must_use]
pub fn decode_octahedral(uv: Vec2) -> Vec3 {
    let f = uv * 2.0 - Vec2::ONE;
    let mut n = Vec3::new(f.x, f.y, 1.0 - f.x.abs() - f.y.abs());
    let t = (-n.z).clamp(0.0, 1.0);
    n.x += if n.x >= 0.0 { -t } else { t };
    n.y += if n.y >= 0.0 { -t } else { t };
    n.normalize()
}

// ============================================================================
// Squircle distance (cascade region selection)
// ============================================================================

/// Power-4 Minkowski norm on the XZ plane, normalized by `half_width`.
///
/// Iso-contours are rounded squares; a point is inside cascade `i` when its
/// squircle distance to the cascade center is below 1.0. The shader uses
/// the same expression for cascade selection and blending.
#[must_use]
pub fn squircle_distance(point_xz: Vec2, center_xz: Vec2, half_width: f32) -> f32 {
    let d = (point_xz - center_xz) / half_width.max(1e-6);
    (d.x.powi(4) + d.y.powi(4)).powf(0.25)
}

// ============================================================================
// Sample sequences
// ============================================================================

/// Halton sequence element (1-based index), used for the TAA jitter offsets.
#[must_use]
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0f32;
    let mut r = 0.0f32;
    while index > 0 {
        f /= base as f32;
        r += f * (index % base) as f32;
        index /= base;
    }
    r
}

/// Vogel disk sample `i` of `n`, rotated by `phi` radians.
///
/// The lighting and SSGI shaders use the same golden-angle spiral; the CPU
/// copy exists so tests can validate the distribution.
#[must_use]
pub fn vogel_disk(i: u32, n: u32, phi: f32) -> Vec2 {
    const GOLDEN_ANGLE: f32 = 2.399_963;
    let r = ((i as f32 + 0.5) / n as f32).sqrt();
    let theta = i as f32 * GOLDEN_ANGLE + phi;
    Vec2::new(r * theta.cos(), r * theta.sin())
}
