//! Error types for session setup, configuration and persistence

use thiserror::Error;

use crate::sim::TrialPhase;

#[derive(Debug, Error)]
pub enum ExperimentError {
    /// No participant identifier was entered
    #[error("participant identifier is required")]
    MissingParticipant,

    #[error("participant identifier {0:?} is invalid (use up to 64 letters, digits, '-', '_' or '.')")]
    InvalidParticipant(String),

    /// Phase/trial pair has no entry in the target table
    #[error("no targets defined for {phase} trial {trial}")]
    MissingTrial { phase: TrialPhase, trial: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("persistence request failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, ExperimentError>;
