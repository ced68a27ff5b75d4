//! Frame description in screen space
//!
//! Turns a `Snapshot` into a flat list of draw commands. Which targets
//! appear is already decided by the simulation; this only places them.

use glam::DVec2;

use crate::heading_to_direction;
use crate::input::HoldFeedback;
use crate::sim::{ExperimentPhase, PlayerState, Snapshot, TrialPhase, TrialStage, Viewport};

/// Avatar triangle proportions (pixels)
pub const AVATAR_TIP: f64 = 30.0;
pub const AVATAR_BASE: f64 = 20.0;
pub const AVATAR_HALF_WIDTH: f64 = 17.0;

/// Palette
pub const BACKGROUND: &str = "#030301";
pub const AVATAR: &str = "#ff4365";
pub const BORDER: &str = "#fffff3";
pub const TARGET: &str = "#00d9c0";
pub const CLOCK: &str = "#b7ad99";

/// Distance bar (top-left), saturating at 2 m
const BAR_ORIGIN: DVec2 = DVec2::new(50.0, 50.0);
const BAR_SIZE: DVec2 = DVec2::new(400.0, 20.0);
const BAR_PIXELS_PER_METER: f64 = 200.0;
/// Rotation dial, inset from the top-right corner
const DIAL_INSET: f64 = 100.0;
const DIAL_RADIUS: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Clear {
        color: &'static str,
    },
    Circle {
        center: DVec2,
        radius: f64,
        color: &'static str,
        filled: bool,
    },
    Triangle {
        points: [DVec2; 3],
        color: &'static str,
    },
    Rect {
        origin: DVec2,
        size: DVec2,
        color: &'static str,
        filled: bool,
    },
    Line {
        from: DVec2,
        to: DVec2,
        color: &'static str,
        width: f64,
    },
    Text {
        pos: DVec2,
        text: String,
        color: &'static str,
    },
}

/// Avatar triangle for `body`: tip along the heading, base behind it
pub fn avatar_triangle(body: &PlayerState, viewport: &Viewport) -> [DVec2; 3] {
    let center = viewport.to_screen(body.pos);
    // Screen y points down, so flip the world direction
    let forward = heading_to_direction(body.heading) * DVec2::new(1.0, -1.0);
    let side = DVec2::new(-forward.y, forward.x);

    let tip = center + forward * AVATAR_TIP;
    let base = center - forward * AVATAR_BASE;
    [
        tip,
        base + side * AVATAR_HALF_WIDTH,
        base - side * AVATAR_HALF_WIDTH,
    ]
}

/// Draw list for one frame
pub fn build_frame(
    snapshot: &Snapshot,
    viewport: &Viewport,
    arena_radius: f64,
    target_radius: f64,
    hold: &HoldFeedback,
) -> Vec<DrawCmd> {
    let mut cmds = vec![DrawCmd::Clear { color: BACKGROUND }];
    if !snapshot.shows_arena() {
        return cmds;
    }

    cmds.push(DrawCmd::Circle {
        center: viewport.center,
        radius: viewport.to_screen_len(arena_radius),
        color: BORDER,
        filled: false,
    });

    for target in &snapshot.visible_targets {
        cmds.push(DrawCmd::Circle {
            center: viewport.to_screen(target.pos),
            radius: viewport.to_screen_len(target_radius),
            color: TARGET,
            filled: true,
        });
    }

    // The annotation marker replaces the avatar once exploration ends
    match (snapshot.stage, snapshot.marker) {
        (TrialStage::Annotation | TrialStage::Feedback, Some(marker)) => {
            cmds.push(DrawCmd::Triangle {
                points: avatar_triangle(&marker, viewport),
                color: CLOCK,
            })
        }
        _ => cmds.push(DrawCmd::Triangle {
            points: avatar_triangle(&snapshot.player, viewport),
            color: AVATAR,
        }),
    }

    if let Some(text) = hud_text(snapshot) {
        cmds.push(DrawCmd::Text {
            pos: DVec2::new(10.0, 30.0),
            text,
            color: CLOCK,
        });
    }

    if snapshot.stage == TrialStage::Exploration {
        if let Some(distance) = hold.distance {
            cmds.extend(thermometer(distance));
        }
        if let Some(rotation) = hold.rotation {
            let center = DVec2::new(viewport.center.x * 2.0 - DIAL_INSET, DIAL_INSET);
            cmds.extend(rotation_dial(center, rotation));
        }
    }
    cmds
}

/// Outlined bar filled in proportion to the distance of the current hold
pub fn thermometer(distance: f64) -> [DrawCmd; 2] {
    let fill = (distance * BAR_PIXELS_PER_METER).clamp(0.0, BAR_SIZE.x);
    [
        DrawCmd::Rect {
            origin: BAR_ORIGIN,
            size: BAR_SIZE,
            color: BORDER,
            filled: false,
        },
        DrawCmd::Rect {
            origin: BAR_ORIGIN,
            size: DVec2::new(fill, BAR_SIZE.y),
            color: CLOCK,
            filled: true,
        },
    ]
}

/// Clock face with a hand at the angle turned in the current hold
pub fn rotation_dial(center: DVec2, rotation: f64) -> [DrawCmd; 3] {
    let hand = heading_to_direction(rotation) * DVec2::new(1.0, -1.0) * DIAL_RADIUS;
    [
        DrawCmd::Circle {
            center,
            radius: DIAL_RADIUS,
            color: BORDER,
            filled: false,
        },
        DrawCmd::Line {
            from: center,
            to: center + hand,
            color: CLOCK,
            width: 4.0,
        },
        DrawCmd::Text {
            pos: center + DVec2::new(-20.0, 5.0),
            text: format!("{rotation:.1}°"),
            color: BORDER,
        },
    ]
}

/// Score in practice, trial counter elsewhere
fn hud_text(snapshot: &Snapshot) -> Option<String> {
    let phase = snapshot.phase.trial_phase()?;
    if phase == TrialPhase::Practice {
        return Some(format!(
            "Score: {}/{}",
            snapshot.practice_score, snapshot.practice_goal
        ));
    }
    let counter = format!("{}/{}", snapshot.trial, snapshot.trial_count);
    if phase.has_annotation() && snapshot.stage == TrialStage::Annotation {
        Some(format!("{counter}  Where was the goal?"))
    } else {
        Some(counter)
    }
}

/// Image for an instruction screen, if the phase shows one
pub fn instruction_image(phase: ExperimentPhase) -> Option<String> {
    match phase {
        ExperimentPhase::Instructions(n) => Some(format!("images/instructions/{n}.png")),
        _ => None,
    }
}
