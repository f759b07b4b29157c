//! Two-ray triangulation of a target from thrown tracking eyes.
//!
//! Each throw defines a ray on the horizontal plane: it starts at the throw's
//! origin and points toward the location the eye flew to. The intersection of
//! the two rays is the target. Vertical coordinates never take part in the
//! calculation and the result always sits on the surface plane (`y == 0`).

use crate::Vec3;
use serde::{Deserialize, Serialize};

/// Below this magnitude of the 2D cross product the rays count as parallel.
pub const PARALLEL_EPSILON: f64 = 1e-6;

/// Horizontal scale between the surface layer and the compressed layer.
pub const COMPRESSED_LAYER_SCALE: f64 = 8.0;

pub const REQUIRED_THROWS: usize = 2;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ThrowEvent {
    pub origin: Vec3,
    pub target: Vec3,
    pub timestamp: u64,
}

impl ThrowEvent {
    pub fn new(origin: Vec3, target: Vec3, timestamp: u64) -> Self {
        Self {
            origin,
            target,
            timestamp,
        }
    }

    /// Horizontal (x, z) origin of the ray.
    pub fn horizontal_origin(&self) -> (f64, f64) {
        (self.origin.x, self.origin.z)
    }

    /// Unit direction on the horizontal plane, or `None` when the eye flew
    /// straight up or down.
    pub fn horizontal_direction(&self) -> Option<(f64, f64)> {
        let dx = self.target.x - self.origin.x;
        let dz = self.target.z - self.origin.z;
        let length = (dx * dx + dz * dz).sqrt();
        if length > 0.0 {
            Some((dx / length, dz / length))
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Triangulation {
    pub surface: Vec3,
    pub compressed: Vec3,
}

impl Triangulation {
    pub fn from_surface(surface: Vec3) -> Self {
        Self {
            surface,
            compressed: Vec3::new(
                surface.x / COMPRESSED_LAYER_SCALE,
                surface.y,
                surface.z / COMPRESSED_LAYER_SCALE,
            ),
        }
    }
}

/// Intersects the rays of exactly two throws.
///
/// Returns `None` for any other number of throws, for a throw without a
/// horizontal direction, and for (near) parallel rays.
pub fn triangulate(throws: &[ThrowEvent]) -> Option<Triangulation> {
    if throws.len() != REQUIRED_THROWS {
        return None;
    }

    intersect_rays(&throws[0], &throws[1]).map(Triangulation::from_surface)
}

fn intersect_rays(first: &ThrowEvent, second: &ThrowEvent) -> Option<Vec3> {
    let (x1, z1) = first.horizontal_origin();
    let (dx1, dz1) = first.horizontal_direction()?;
    let (x2, z2) = second.horizontal_origin();
    let (dx2, dz2) = second.horizontal_direction()?;

    let cross = dx1 * dz2 - dz1 * dx2;
    if cross.abs() < PARALLEL_EPSILON {
        return None;
    }

    let rel_x = x2 - x1;
    let rel_z = z2 - z1;
    let distance = (rel_x * dz2 - rel_z * dx2) / cross;

    Some(Vec3::new(x1 + dx1 * distance, 0.0, z1 + dz1 * distance))
}
