//! Targets, collection checks and the predefined target table

use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::geometry::{ArenaSpec, distance, is_inside_arena};
use super::state::TrialPhase;
use crate::error::{ExperimentError, Result};
use crate::settings::TrialCounts;

/// A target location (meters). The radius is shared by all targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target {
    pub pos: DVec2,
}

impl Target {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            pos: DVec2::new(x, y),
        }
    }
}

/// First target (in sequence order) whose center is within `radius` of the player
pub fn check_collection(player: DVec2, targets: &[Target], radius: f64) -> Option<Target> {
    targets
        .iter()
        .find(|t| distance(player, t.pos) <= radius)
        .copied()
}

/// Targets of the running trial plus the goal captured so far
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    active: Vec<Target>,
    goal: Option<Target>,
    /// Player was inside a target on the previous check
    was_inside: bool,
}

impl TargetSet {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            active: targets,
            goal: None,
            was_inside: false,
        }
    }

    /// Targets still in play
    pub fn active(&self) -> &[Target] {
        &self.active
    }

    /// First target captured this trial
    pub fn goal(&self) -> Option<Target> {
        self.goal
    }

    /// Swap in a single target (practice respawn).
    /// The player must leave and re-enter before it can be collected.
    pub fn replace(&mut self, target: Target) {
        self.active.clear();
        self.active.push(target);
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.was_inside = false;
    }

    /// Target entered since the previous check, if any.
    ///
    /// Fires only on the outside → inside edge, so standing still inside a
    /// target reports it once.
    pub fn collect(&mut self, player: DVec2, radius: f64) -> Option<Target> {
        let hit = check_collection(player, &self.active, radius);
        let entered = hit.is_some() && !self.was_inside;
        self.was_inside = hit.is_some();
        hit.filter(|_| entered)
    }

    /// Goal-capture check for table-driven trials.
    ///
    /// Edge-triggered like `collect`. The first capture is kept as the goal
    /// and the active set collapses to the captured target.
    pub fn capture(&mut self, player: DVec2, radius: f64) -> Option<Target> {
        let target = self.collect(player, radius)?;
        if self.goal.is_none() {
            self.goal = Some(target);
        }
        self.active.clear();
        self.active.push(target);
        Some(target)
    }
}

/// Serialized form of one table entry
#[derive(Debug, Clone, Deserialize)]
struct TableEntry {
    phase: TrialPhase,
    trial: u32,
    targets: Vec<Target>,
}

/// Fixed targets keyed by (phase, 1-based trial index)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetTable {
    entries: BTreeMap<(TrialPhase, u32), Vec<Target>>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table used by the standard experiment (3 training, 2 dark, 5 test)
    pub fn standard() -> Self {
        use TrialPhase::*;
        let rows: [(TrialPhase, u32, [(f64, f64); 3]); 10] = [
            (Training, 1, [(-0.5, -1.0), (0.3, 0.8), (-1.0, 0.2)]),
            (Training, 2, [(0.7, -0.8), (-0.4, 0.9), (0.3, -1.2)]),
            (Training, 3, [(-0.8, -0.5), (0.5, 0.5), (0.2, -1.0)]),
            (DarkTraining, 1, [(-0.6, -0.9), (0.4, 0.7), (-0.9, 0.1)]),
            (DarkTraining, 2, [(0.2, -1.0), (-0.3, 0.8), (0.7, -0.6)]),
            (Test, 1, [(0.5, 1.0), (-0.8, -0.2), (0.7, -0.7)]),
            (Test, 2, [(-0.3, 0.7), (0.8, 0.2), (-0.9, -0.9)]),
            (Test, 3, [(0.4, -0.4), (-0.6, 0.8), (0.2, 1.0)]),
            (Test, 4, [(0.9, -0.3), (-0.4, -1.0), (1.0, 0.8)]),
            (Test, 5, [(-0.2, -0.8), (0.5, 0.6), (-0.7, 1.2)]),
        ];

        let mut table = Self::new();
        for (phase, trial, points) in rows {
            let targets = points.iter().map(|&(x, y)| Target::new(x, y)).collect();
            table.insert(phase, trial, targets);
        }
        table
    }

    /// Parse a table from a JSON list of `{phase, trial, targets}` entries
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<TableEntry> = serde_json::from_str(json)
            .map_err(|e| ExperimentError::InvalidConfig(format!("target table: {e}")))?;
        let mut table = Self::new();
        for row in rows {
            table.insert(row.phase, row.trial, row.targets);
        }
        Ok(table)
    }

    pub fn insert(&mut self, phase: TrialPhase, trial: u32, targets: Vec<Target>) {
        self.entries.insert((phase, trial), targets);
    }

    /// Targets for one trial
    pub fn get(&self, phase: TrialPhase, trial: u32) -> Result<&[Target]> {
        self.entries
            .get(&(phase, trial))
            .map(Vec::as_slice)
            .ok_or(ExperimentError::MissingTrial { phase, trial })
    }

    /// Every trial the state machine can reach must have a non-empty entry
    /// with all targets inside the arena.
    pub fn validate(&self, counts: &TrialCounts, arena: &ArenaSpec) -> Result<()> {
        for phase in TrialPhase::TABLE_PHASES {
            for trial in 1..=counts.for_phase(phase) {
                let targets = self.get(phase, trial)?;
                if targets.is_empty() {
                    return Err(ExperimentError::MissingTrial { phase, trial });
                }
                if let Some(t) = targets.iter().find(|t| !is_inside_arena(t.pos, arena)) {
                    return Err(ExperimentError::InvalidConfig(format!(
                        "{phase} trial {trial}: target ({}, {}) lies outside the arena",
                        t.pos.x, t.pos.y
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
