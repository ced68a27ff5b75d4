//! Navigation simulation module
//!
//! All experiment logic lives here. This module must stay pure:
//! - Variable timestep, every rate scaled by elapsed seconds
//! - Seeded RNG only
//! - Stable iteration order (targets in table order)
//! - No rendering, audio or network dependencies

pub mod geometry;
pub mod player;
pub mod record;
pub mod state;
pub mod targets;
pub mod tick;

pub use geometry::{
    ArenaSpec, Viewport, distance, is_inside_arena, is_near_border, sample_in_arena,
};
pub use player::{MoveDirection, PlayerState, RotateDirection};
pub use record::{Outbound, SessionSummary, Snapshot, TrajectorySample, TrialRecord};
pub use state::{
    ExperimentPhase, ExperimentState, GameEvent, ParticipantId, TrialPhase, TrialStage,
};
pub use targets::{Target, TargetSet, TargetTable, check_collection};
pub use tick::{TickInput, tick};
