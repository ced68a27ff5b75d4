//! Arena Nav - a spatial-navigation experiment in a circular arena
//!
//! Core modules:
//! - `sim`: Navigation simulation (kinematics, targets, phase/trial state machine)
//! - `input`: Held-key tracking and key → command mapping
//! - `persistence`: Record sinks (HTTP, LocalStorage backup, JSON lines)
//! - `renderer`: Frame description and Canvas2D output
//! - `audio`: Feedback cues for border proximity and target collection
//! - `settings`: Experiment configuration

pub mod audio;
pub mod error;
pub mod input;
pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use error::ExperimentError;
pub use settings::{ExperimentConfig, TrialCounts};

use glam::DVec2;

/// Experiment defaults (meters, seconds, degrees, pixels)
pub mod consts {
    /// Arena dimensions
    pub const ARENA_DIAMETER: f64 = 3.3;
    pub const ARENA_RADIUS: f64 = ARENA_DIAMETER / 2.0;
    /// Distance from the wall at which the player counts as "near the border"
    pub const BORDER_THRESHOLD: f64 = 0.1;

    /// Shared radius of every target
    pub const TARGET_RADIUS: f64 = 0.1;

    /// Meters per second
    pub const MOVE_SPEED: f64 = 1.0;
    /// Degrees per second
    pub const ROTATE_SPEED: f64 = 90.0;

    /// Viewport (pixels per meter, window size)
    pub const SCALE: f64 = 200.0;
    pub const WIN_WIDTH: f64 = 1000.0;
    pub const WIN_HEIGHT: f64 = 800.0;

    /// Collections needed before practice may be left
    pub const PRACTICE_SCORE_GOAL: u32 = 5;

    /// Trials per phase
    pub const TRAINING_TRIALS: u32 = 3;
    pub const DARK_TRAINING_TRIALS: u32 = 2;
    pub const TEST_TRIALS: u32 = 5;

    /// Seconds between trajectory samples
    pub const TRAJECTORY_INTERVAL: f64 = 0.1;
}

/// Normalize an angle in degrees to [0, 360)
#[inline]
pub fn normalize_angle_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180]
#[inline]
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    let delta = normalize_angle_degrees(to - from);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Unit direction for a heading in degrees (0 = +y, clockwise positive)
#[inline]
pub fn heading_to_direction(heading: f64) -> DVec2 {
    let rad = heading.to_radians();
    DVec2::new(rad.sin(), rad.cos())
}

/// Heading in degrees that points from `from` toward `to`
#[inline]
pub fn direction_to_heading(from: DVec2, to: DVec2) -> f64 {
    let d = to - from;
    normalize_angle_degrees(d.x.atan2(d.y).to_degrees())
}

/// Convert polar (r, theta in radians) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f64, theta: f64) -> DVec2 {
    DVec2::new(r * theta.cos(), r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_negative_angle() {
        assert!((normalize_angle_degrees(-5.0) - 355.0).abs() < 1e-9);
        assert_eq!(normalize_angle_degrees(360.0), 0.0);
        assert_eq!(normalize_angle_degrees(-1e-20), 0.0);
        assert!((normalize_angle_degrees(725.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_heading_direction() {
        let north = heading_to_direction(0.0);
        assert!(north.x.abs() < 1e-12 && (north.y - 1.0).abs() < 1e-12);

        let east = heading_to_direction(90.0);
        assert!((east.x - 1.0).abs() < 1e-12 && east.y.abs() < 1e-12);

        let h = direction_to_heading(DVec2::ZERO, DVec2::new(-1.0, 0.0));
        assert!((h - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_delta_wraps() {
        assert!((shortest_angle_delta(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((shortest_angle_delta(10.0, 350.0) + 20.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn normalized_angle_in_range(a in -1.0e6f64..1.0e6) {
            let n = normalize_angle_degrees(a);
            prop_assert!((0.0..360.0).contains(&n));
        }

        #[test]
        fn normalized_angle_ignores_full_turns(a in -720.0f64..720.0, k in -50i32..50) {
            let n1 = normalize_angle_degrees(a);
            let n2 = normalize_angle_degrees(a + 360.0 * k as f64);
            // Equal up to wraparound at the 0/360 seam
            let diff = (n1 - n2).abs();
            prop_assert!(diff < 1e-9 || (360.0 - diff) < 1e-9);
        }
    }
}
