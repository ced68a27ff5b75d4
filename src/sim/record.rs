//! Read-only views of the experiment handed to collaborators
//!
//! `TrialRecord` and `SessionSummary` go to the persistence sink;
//! `Snapshot` is everything a renderer needs for one frame.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::player::PlayerState;
use super::state::{ExperimentPhase, TrialPhase, TrialStage};
use super::targets::Target;

/// One trajectory sample (session clock seconds, meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub stage: TrialStage,
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// Result of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub participant_id: String,
    pub phase: TrialPhase,
    pub trial: u32,
    /// "<phase> <trial>", e.g. "dark_training 2"
    pub trial_info: String,
    pub final_position: DVec2,
    pub final_heading: f64,
    /// Recalled goal location (test trials)
    pub annotation: Option<DVec2>,
    pub encountered_goal: Option<DVec2>,
    /// Seconds from trial start to the end of exploration
    pub exploration_time: f64,
    /// Seconds spent placing the annotation
    pub annotation_time: Option<f64>,
    /// Distance between annotation and encountered goal
    pub error_distance: Option<f64>,
    /// Session clock when the record was produced
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<TrajectorySample>,
}

/// Final record of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub participant_id: String,
    pub trials_completed: u32,
    pub practice_score: u32,
    /// Session clock at completion (seconds)
    pub total_time: f64,
}

/// Payload sent to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    Trial(TrialRecord),
    Session(SessionSummary),
}

impl Outbound {
    pub fn participant_id(&self) -> &str {
        match self {
            Outbound::Trial(r) => &r.participant_id,
            Outbound::Session(s) => &s.participant_id,
        }
    }
}

/// Per-frame view for the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: ExperimentPhase,
    pub stage: TrialStage,
    pub trial: u32,
    pub trial_count: u32,
    pub practice_score: u32,
    pub practice_goal: u32,
    pub player: PlayerState,
    /// Annotation marker while annotating or reviewing feedback
    pub marker: Option<PlayerState>,
    /// Targets the participant may see this frame
    pub visible_targets: Vec<Target>,
    pub near_border: bool,
}

impl Snapshot {
    /// Whether the arena is drawn at all (not on welcome/instruction/complete screens)
    pub fn shows_arena(&self) -> bool {
        self.phase.trial_phase().is_some()
    }
}
