//! Key state → per-frame commands
//!
//! The browser delivers press/release events; the simulation wants one
//! `TickInput` per frame. `InputMapper` sits between them: it tracks which
//! keys are down, latches the advance key until the next frame, and
//! remembers where a movement or rotation hold started so the hold can be
//! logged when the key is released.

use glam::DVec2;

use crate::shortest_angle_delta;
use crate::sim::{MoveDirection, PlayerState, RotateDirection, TickInput};

/// Logical keys of the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
    Advance,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    pub fn from_key_name(name: &str) -> Option<Self> {
        match name {
            "ArrowUp" => Some(Key::Forward),
            "ArrowDown" => Some(Key::Backward),
            "ArrowLeft" => Some(Key::Left),
            "ArrowRight" => Some(Key::Right),
            "Enter" => Some(Key::Advance),
            _ => None,
        }
    }

    fn index(self) -> Option<usize> {
        match self {
            Key::Forward => Some(0),
            Key::Backward => Some(1),
            Key::Left => Some(2),
            Key::Right => Some(3),
            Key::Advance => None,
        }
    }
}

/// A completed hold, reported on key release
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldLog {
    Moved {
        start: DVec2,
        end: DVec2,
        distance: f64,
    },
    Rotated {
        start: f64,
        end: f64,
        /// Signed total turned during the hold (degrees, may exceed 360)
        delta: f64,
    },
}

#[derive(Debug, Clone, Copy)]
struct ActiveMove {
    direction: MoveDirection,
    start: DVec2,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRotate {
    direction: RotateDirection,
    start: f64,
    /// Heading at the last `track`
    last: f64,
    /// Signed degrees turned since the press, not wrapped
    turned: f64,
}

impl ActiveRotate {
    fn new(direction: RotateDirection, heading: f64) -> Self {
        Self {
            direction,
            start: heading,
            last: heading,
            turned: 0.0,
        }
    }

    fn track(&mut self, heading: f64) {
        self.turned += shortest_angle_delta(self.last, heading);
        self.last = heading;
    }
}

/// Live state of the current holds, for on-screen feedback
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HoldFeedback {
    /// Straight-line distance since the movement key went down
    pub distance: Option<f64>,
    /// Signed degrees turned since the rotation key went down
    pub rotation: Option<f64>,
}

/// Held-key tracker
#[derive(Debug, Clone, Default)]
pub struct InputMapper {
    held: [bool; 4],
    /// First-pressed movement key wins until released
    moving: Option<ActiveMove>,
    rotating: Option<ActiveRotate>,
    advance_pending: bool,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key went down. `body` is whatever the keys steer right now.
    /// Auto-repeat presses of a held key are ignored.
    pub fn press(&mut self, key: Key, body: &PlayerState) {
        let Some(i) = key.index() else {
            self.advance_pending = true;
            return;
        };
        if self.held[i] {
            return;
        }
        self.held[i] = true;

        match key {
            Key::Forward | Key::Backward if self.moving.is_none() => {
                self.moving = Some(ActiveMove {
                    direction: move_direction(key),
                    start: body.pos,
                });
            }
            Key::Left | Key::Right if self.rotating.is_none() => {
                self.rotating = Some(ActiveRotate::new(rotate_direction(key), body.heading));
            }
            _ => {}
        }
    }

    /// Key went up. Returns the finished hold if this released the active
    /// key of its axis; a still-held opposite key then takes over.
    pub fn release(&mut self, key: Key, body: &PlayerState) -> Option<HoldLog> {
        let i = key.index()?;
        if !self.held[i] {
            return None;
        }
        self.held[i] = false;

        match key {
            Key::Forward | Key::Backward => {
                let active = self.moving.filter(|m| m.direction == move_direction(key))?;
                let opposite = match key {
                    Key::Forward => Key::Backward,
                    _ => Key::Forward,
                };
                self.moving = self.is_held(opposite).then(|| ActiveMove {
                    direction: move_direction(opposite),
                    start: body.pos,
                });
                Some(HoldLog::Moved {
                    start: active.start,
                    end: body.pos,
                    distance: active.start.distance(body.pos),
                })
            }
            _ => {
                let mut active = self
                    .rotating
                    .filter(|r| r.direction == rotate_direction(key))?;
                active.track(body.heading);
                let opposite = match key {
                    Key::Left => Key::Right,
                    _ => Key::Left,
                };
                self.rotating = self
                    .is_held(opposite)
                    .then(|| ActiveRotate::new(rotate_direction(opposite), body.heading));
                Some(HoldLog::Rotated {
                    start: active.start,
                    end: body.heading,
                    delta: active.turned,
                })
            }
        }
    }

    pub fn is_held(&self, key: Key) -> bool {
        key.index().is_some_and(|i| self.held[i])
    }

    /// Follow the steered body once per frame so turns past 180° add up.
    /// Frames must be short enough that no single one turns 180° or more.
    pub fn track(&mut self, body: &PlayerState) {
        if let Some(r) = &mut self.rotating {
            r.track(body.heading);
        }
    }

    /// Restart running holds at `body` (the steered body was swapped or reset)
    pub fn rebase(&mut self, body: &PlayerState) {
        if let Some(m) = &mut self.moving {
            m.start = body.pos;
        }
        if let Some(r) = &mut self.rotating {
            *r = ActiveRotate::new(r.direction, body.heading);
        }
    }

    /// Distance from where the current movement hold started
    pub fn moved_since_press(&self, body: &PlayerState) -> Option<f64> {
        self.moving.map(|m| m.start.distance(body.pos))
    }

    /// Hold progress as of the last `track`
    pub fn feedback(&self, body: &PlayerState) -> HoldFeedback {
        HoldFeedback {
            distance: self.moved_since_press(body),
            rotation: self.rotating.map(|r| r.turned),
        }
    }

    /// Commands for this frame; consumes a pending advance
    pub fn take_input(&mut self) -> TickInput {
        TickInput {
            movement: self.moving.map(|m| m.direction),
            rotation: self.rotating.map(|r| r.direction),
            advance: std::mem::take(&mut self.advance_pending),
        }
    }

    /// Drop all held keys (e.g. when the window loses focus)
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn move_direction(key: Key) -> MoveDirection {
    if key == Key::Backward {
        MoveDirection::Backward
    } else {
        MoveDirection::Forward
    }
}

fn rotate_direction(key: Key) -> RotateDirection {
    if key == Key::Left {
        RotateDirection::Left
    } else {
        RotateDirection::Right
    }
}
