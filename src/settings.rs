//! Experiment configuration
//!
//! Read from LocalStorage on the web so an operator can tune a deployment
//! without rebuilding. Defaults are the standard session.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{ExperimentError, Result};
use crate::sim::{ArenaSpec, TrialPhase, Viewport};

/// Number of trials in each target-table phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCounts {
    pub training: u32,
    pub dark_training: u32,
    pub test: u32,
}

impl Default for TrialCounts {
    fn default() -> Self {
        Self {
            training: TRAINING_TRIALS,
            dark_training: DARK_TRAINING_TRIALS,
            test: TEST_TRIALS,
        }
    }
}

impl TrialCounts {
    /// Trials in `phase` (practice is a single open-ended trial)
    pub fn for_phase(&self, phase: TrialPhase) -> u32 {
        match phase {
            TrialPhase::Practice => 1,
            TrialPhase::Training => self.training,
            TrialPhase::DarkTraining => self.dark_training,
            TrialPhase::Test => self.test,
        }
    }
}

/// Experiment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    // === Arena ===
    /// Arena radius (meters)
    pub arena_radius: f64,
    /// Border proximity band (meters from the wall)
    pub border_threshold: f64,
    /// Radius shared by all targets (meters)
    pub target_radius: f64,

    // === Kinematics ===
    /// Meters per second
    pub move_speed: f64,
    /// Degrees per second
    pub rotate_speed: f64,

    // === Display ===
    /// Pixels per meter
    pub scale: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,

    // === Sequencing ===
    pub practice_score_goal: u32,
    pub trials: TrialCounts,
    /// Seconds between trajectory samples (0 disables sampling)
    pub trajectory_interval: f64,

    // === Persistence ===
    /// Endpoint receiving trial and session records (POST, JSON)
    pub save_endpoint: String,
    /// Page to open once the experiment is complete
    pub completion_url: Option<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            arena_radius: ARENA_RADIUS,
            border_threshold: BORDER_THRESHOLD,
            target_radius: TARGET_RADIUS,

            move_speed: MOVE_SPEED,
            rotate_speed: ROTATE_SPEED,

            scale: SCALE,
            viewport_width: WIN_WIDTH,
            viewport_height: WIN_HEIGHT,

            practice_score_goal: PRACTICE_SCORE_GOAL,
            trials: TrialCounts::default(),
            trajectory_interval: TRAJECTORY_INTERVAL,

            save_endpoint: "/api/save_trial".to_string(),
            completion_url: None,
        }
    }
}

impl ExperimentConfig {
    /// Parse a configuration from JSON (missing fields take defaults)
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ExperimentError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the simulation relies on
    pub fn validate(&self) -> Result<()> {
        ArenaSpec::new(self.arena_radius, self.border_threshold)?;

        if !(self.target_radius > 0.0) {
            return Err(ExperimentError::InvalidConfig(format!(
                "target radius must be positive, got {}",
                self.target_radius
            )));
        }
        if !(self.move_speed >= 0.0) || !(self.rotate_speed >= 0.0) {
            return Err(ExperimentError::InvalidConfig(
                "speeds must be non-negative".to_string(),
            ));
        }
        if !(self.scale > 0.0) {
            return Err(ExperimentError::InvalidConfig(
                "scale must be positive".to_string(),
            ));
        }
        if self.practice_score_goal == 0 {
            return Err(ExperimentError::InvalidConfig(
                "practice score goal must be at least 1".to_string(),
            ));
        }
        for phase in TrialPhase::TABLE_PHASES {
            if self.trials.for_phase(phase) == 0 {
                return Err(ExperimentError::InvalidConfig(format!(
                    "{phase} needs at least one trial"
                )));
            }
        }
        if !(self.trajectory_interval >= 0.0) {
            return Err(ExperimentError::InvalidConfig(
                "trajectory interval must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Arena geometry. Assumes `validate` has passed.
    pub fn arena(&self) -> ArenaSpec {
        ArenaSpec {
            radius: self.arena_radius,
            border_threshold: self.border_threshold,
        }
    }

    /// World → screen transform centered in the viewport
    pub fn viewport(&self) -> Viewport {
        Viewport::new(
            DVec2::new(self.viewport_width / 2.0, self.viewport_height / 2.0),
            self.scale,
        )
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "arena_nav_config";

    /// Load configuration from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(config) => {
                        log::info!("Loaded experiment config from LocalStorage");
                        return config;
                    }
                    Err(e) => log::warn!("Ignoring stored config: {}", e),
                }
            }
        }

        log::info!("Using default experiment config");
        Self::default()
    }

    /// Native stub
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }
}
