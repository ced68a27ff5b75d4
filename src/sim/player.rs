//! Player kinematics
//!
//! Variable-timestep integration: every rate is multiplied by the real
//! elapsed seconds of the frame.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::geometry::{ArenaSpec, is_inside_arena};
use crate::{heading_to_direction, normalize_angle_degrees};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotateDirection {
    /// Counter-clockwise (heading decreases)
    Left,
    /// Clockwise (heading increases)
    Right,
}

/// Position (meters, arena-centered) and heading (degrees in [0, 360))
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub pos: DVec2,
    pub heading: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            pos: DVec2::ZERO,
            heading: 0.0,
        }
    }
}

impl PlayerState {
    /// Back to the arena center, facing +y
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Step along the heading. The step is committed only if the new
    /// position is inside the arena; otherwise nothing changes (no sliding
    /// along the wall). Returns whether the position was updated.
    pub fn try_move(
        &mut self,
        direction: MoveDirection,
        dt: f64,
        speed: f64,
        arena: &ArenaSpec,
    ) -> bool {
        if dt <= 0.0 {
            return false;
        }

        let step = heading_to_direction(self.heading) * speed * dt;
        let candidate = match direction {
            MoveDirection::Forward => self.pos + step,
            MoveDirection::Backward => self.pos - step,
        };

        if is_inside_arena(candidate, arena) {
            self.pos = candidate;
            true
        } else {
            false
        }
    }

    /// Turn in place. Never constrained by the arena.
    pub fn rotate(&mut self, direction: RotateDirection, dt: f64, speed: f64) {
        if dt <= 0.0 {
            return;
        }
        let delta = speed * dt;
        let heading = match direction {
            RotateDirection::Left => self.heading - delta,
            RotateDirection::Right => self.heading + delta,
        };
        self.heading = normalize_angle_degrees(heading);
    }
}
