//! Arena geometry and world/screen transforms
//!
//! World space is meters with the origin at the arena center and +y "up";
//! screen space is pixels with the origin top-left and +y down.

use glam::DVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ExperimentError, Result};
use crate::polar_to_cartesian;

/// Circular arena centered on the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaSpec {
    /// Wall radius (meters)
    pub radius: f64,
    /// Width of the band inside the wall that counts as "near the border"
    pub border_threshold: f64,
}

impl ArenaSpec {
    /// Requires `radius > border_threshold > 0`
    pub fn new(radius: f64, border_threshold: f64) -> Result<Self> {
        if !(border_threshold > 0.0 && radius > border_threshold) {
            return Err(ExperimentError::InvalidConfig(format!(
                "arena needs radius > border threshold > 0 (radius {radius}, threshold {border_threshold})"
            )));
        }
        Ok(Self {
            radius,
            border_threshold,
        })
    }
}

/// Euclidean distance
#[inline]
pub fn distance(a: DVec2, b: DVec2) -> f64 {
    a.distance(b)
}

/// True if `p` lies on or inside the arena wall
#[inline]
pub fn is_inside_arena(p: DVec2, arena: &ArenaSpec) -> bool {
    distance(p, DVec2::ZERO) <= arena.radius
}

/// True if `p` is within the border band
#[inline]
pub fn is_near_border(p: DVec2, arena: &ArenaSpec) -> bool {
    distance(p, DVec2::ZERO) >= arena.radius - arena.border_threshold
}

/// Uniform random point inside a disc of `radius`.
///
/// Uses r = R·sqrt(u) so points are not bunched toward the center.
pub fn sample_in_arena<R: Rng>(rng: &mut R, radius: f64) -> DVec2 {
    let angle = rng.random::<f64>() * std::f64::consts::TAU;
    let r = radius * rng.random::<f64>().sqrt();
    polar_to_cartesian(r, angle)
}

/// Affine world ↔ screen transform (scale, vertical flip, translate)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Screen position of the world origin (pixels)
    pub center: DVec2,
    /// Pixels per meter
    pub scale: f64,
}

impl Viewport {
    pub fn new(center: DVec2, scale: f64) -> Self {
        Self { center, scale }
    }

    /// World meters → screen pixels
    #[inline]
    pub fn to_screen(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            self.center.x + p.x * self.scale,
            self.center.y - p.y * self.scale,
        )
    }

    /// Screen pixels → world meters
    #[inline]
    pub fn to_world(&self, s: DVec2) -> DVec2 {
        DVec2::new(
            (s.x - self.center.x) / self.scale,
            (self.center.y - s.y) / self.scale,
        )
    }

    /// World length → pixel length
    #[inline]
    pub fn to_screen_len(&self, meters: f64) -> f64 {
        meters * self.scale
    }
}
