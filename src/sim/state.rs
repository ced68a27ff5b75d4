//! Experiment state and phase/trial transitions
//!
//! `ExperimentState` is the only owner of session state. Everything that
//! changes the phase, the trial or the target set goes through the named
//! transitions below; outward effects are queued as `GameEvent`s.

use std::fmt;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::geometry::{ArenaSpec, distance, is_near_border, sample_in_arena};
use super::player::PlayerState;
use super::record::{Outbound, SessionSummary, Snapshot, TrajectorySample, TrialRecord};
use super::targets::{Target, TargetSet, TargetTable};
use super::tick::TickInput;
use crate::error::{ExperimentError, Result};
use crate::settings::ExperimentConfig;

/// Redraws allowed when a practice target lands on the player
const PRACTICE_SPAWN_TRIES: usize = 32;

/// Phases that run trials in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    /// Collect randomly placed visible targets
    Practice,
    /// Find one of several visible targets
    Training,
    /// Targets only visible near the border
    DarkTraining,
    /// Hidden targets, then recall the goal location
    Test,
}

impl TrialPhase {
    /// Phases whose targets come from the target table
    pub const TABLE_PHASES: [TrialPhase; 3] = [
        TrialPhase::Training,
        TrialPhase::DarkTraining,
        TrialPhase::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialPhase::Practice => "practice",
            TrialPhase::Training => "training",
            TrialPhase::DarkTraining => "dark_training",
            TrialPhase::Test => "test",
        }
    }

    /// Instruction screen shown once the phase is over
    pub fn next_instruction(&self) -> u8 {
        match self {
            TrialPhase::Practice => 3,
            TrialPhase::Training => 4,
            TrialPhase::DarkTraining => 5,
            TrialPhase::Test => 6,
        }
    }

    /// Trials end with an annotation (recall) stage
    pub fn has_annotation(&self) -> bool {
        matches!(self, TrialPhase::Test)
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage within a single trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStage {
    /// Player explores the arena
    #[default]
    Exploration,
    /// Player steers a marker to where the goal was
    Annotation,
    /// Goal revealed, waiting to continue
    Feedback,
}

/// Where the experiment is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    Welcome,
    /// Instruction screen 1..=6
    Instructions(u8),
    Practice,
    Training,
    DarkTraining,
    Test,
    Complete,
}

impl ExperimentPhase {
    pub fn trial_phase(&self) -> Option<TrialPhase> {
        match self {
            ExperimentPhase::Practice => Some(TrialPhase::Practice),
            ExperimentPhase::Training => Some(TrialPhase::Training),
            ExperimentPhase::DarkTraining => Some(TrialPhase::DarkTraining),
            ExperimentPhase::Test => Some(TrialPhase::Test),
            _ => None,
        }
    }
}

impl From<TrialPhase> for ExperimentPhase {
    fn from(phase: TrialPhase) -> Self {
        match phase {
            TrialPhase::Practice => ExperimentPhase::Practice,
            TrialPhase::Training => ExperimentPhase::Training,
            TrialPhase::DarkTraining => ExperimentPhase::DarkTraining,
            TrialPhase::Test => ExperimentPhase::Test,
        }
    }
}

/// What confirming an instruction screen does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstructionAction {
    Show(u8),
    Start(TrialPhase),
    Finish,
}

fn instruction_action(screen: u8) -> InstructionAction {
    match screen {
        1 => InstructionAction::Show(2),
        2 => InstructionAction::Start(TrialPhase::Practice),
        3 => InstructionAction::Start(TrialPhase::Training),
        4 => InstructionAction::Start(TrialPhase::DarkTraining),
        5 => InstructionAction::Start(TrialPhase::Test),
        _ => InstructionAction::Finish,
    }
}

/// Validated participant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub const MAX_LEN: usize = 64;

    /// Trims whitespace; accepts letters, digits, '-', '_' and '.'
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ExperimentError::MissingParticipant);
        }
        let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
        if id.chars().count() > Self::MAX_LEN || !id.chars().all(valid_char) {
            return Err(ExperimentError::InvalidParticipant(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Side effects for the front-end (audio, persistence, logging)
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PhaseEntered(ExperimentPhase),
    TrialStarted { phase: TrialPhase, trial: u32 },
    BorderEntered,
    BorderExited,
    /// Player entered a target
    TargetCollected { phase: TrialPhase, target: Target },
    /// Practice score goal reached
    PracticeComplete,
    AnnotationStarted,
    FeedbackStarted,
    /// Advance pressed where it has no effect yet
    AdvanceIgnored,
    /// Hand to the persistence sink
    Persist(Outbound),
}

/// One participant session
#[derive(Debug, Clone)]
pub struct ExperimentState {
    participant: ParticipantId,
    config: ExperimentConfig,
    arena: ArenaSpec,
    table: TargetTable,
    rng: Pcg32,

    phase: ExperimentPhase,
    /// 1-based trial within the phase
    trial: u32,
    stage: TrialStage,
    player: PlayerState,
    /// Annotation marker (test trials)
    marker: PlayerState,
    targets: TargetSet,
    practice_score: u32,
    trials_completed: u32,
    near_border: bool,

    /// Session clock (seconds of accumulated frame time)
    clock: f64,
    phase_started_at: f64,
    trial_started_at: f64,
    annotation_started_at: Option<f64>,

    trajectory: Vec<TrajectorySample>,
    next_sample_at: f64,

    events: Vec<GameEvent>,
}

impl ExperimentState {
    /// Start a session on the welcome screen.
    ///
    /// Fails if the config is inconsistent or the table lacks a trial the
    /// configured counts can reach.
    pub fn new(
        participant: ParticipantId,
        config: ExperimentConfig,
        table: TargetTable,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        let arena = config.arena();
        table.validate(&config.trials, &arena)?;

        log::info!("Session started for participant {}", participant);

        Ok(Self {
            participant,
            config,
            arena,
            table,
            rng: Pcg32::seed_from_u64(seed),
            phase: ExperimentPhase::Welcome,
            trial: 0,
            stage: TrialStage::Exploration,
            player: PlayerState::default(),
            marker: PlayerState::default(),
            targets: TargetSet::default(),
            practice_score: 0,
            trials_completed: 0,
            near_border: false,
            clock: 0.0,
            phase_started_at: 0.0,
            trial_started_at: 0.0,
            annotation_started_at: None,
            trajectory: Vec::new(),
            next_sample_at: 0.0,
            events: Vec::new(),
        })
    }

    /// Default config and the standard target table
    pub fn with_defaults(participant: ParticipantId, seed: u64) -> Result<Self> {
        Self::new(
            participant,
            ExperimentConfig::default(),
            TargetTable::standard(),
            seed,
        )
    }

    // === Accessors ===

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn phase(&self) -> ExperimentPhase {
        self.phase
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    /// Trials in the current phase (0 outside trial phases)
    pub fn trial_count(&self) -> u32 {
        self.phase
            .trial_phase()
            .map(|p| self.config.trials.for_phase(p))
            .unwrap_or(0)
    }

    pub fn stage(&self) -> TrialStage {
        self.stage
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn marker(&self) -> &PlayerState {
        &self.marker
    }

    /// The body the movement keys currently steer
    pub fn controlled(&self) -> &PlayerState {
        if self.stage == TrialStage::Annotation {
            &self.marker
        } else {
            &self.player
        }
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn practice_score(&self) -> u32 {
        self.practice_score
    }

    pub fn near_border(&self) -> bool {
        self.near_border
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Seconds since the current phase began
    pub fn phase_elapsed(&self) -> f64 {
        self.clock - self.phase_started_at
    }

    /// Seconds since the current trial began
    pub fn trial_elapsed(&self) -> f64 {
        self.clock - self.trial_started_at
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ExperimentPhase::Complete
    }

    /// Movement keys act in trial phases, except on the feedback screen
    pub fn accepts_movement(&self) -> bool {
        self.phase.trial_phase().is_some() && self.stage != TrialStage::Feedback
    }

    /// Targets the participant may see right now
    pub fn visible_targets(&self) -> &[Target] {
        match (self.phase, self.stage) {
            (ExperimentPhase::Practice | ExperimentPhase::Training, _) => self.targets.active(),
            (ExperimentPhase::DarkTraining, _) if self.near_border => self.targets.active(),
            (ExperimentPhase::Test, TrialStage::Feedback) => self.targets.active(),
            _ => &[],
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let marker = matches!(self.stage, TrialStage::Annotation | TrialStage::Feedback)
            .then_some(self.marker);
        Snapshot {
            phase: self.phase,
            stage: self.stage,
            trial: self.trial,
            trial_count: self.trial_count(),
            practice_score: self.practice_score,
            practice_goal: self.config.practice_score_goal,
            player: self.player,
            marker,
            visible_targets: self.visible_targets().to_vec(),
            near_border: self.near_border,
        }
    }

    /// Take the events queued since the last call
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // === Per-frame update ===

    /// Advance the clock and apply held movement/rotation for `dt` seconds,
    /// then run the border, trajectory and collection checks.
    pub fn update(&mut self, input: &TickInput, dt: f64) {
        let dt = dt.max(0.0);
        self.clock += dt;

        if !self.accepts_movement() {
            return;
        }

        let move_speed = self.config.move_speed;
        let rotate_speed = self.config.rotate_speed;
        let arena = self.arena;
        let body = if self.stage == TrialStage::Annotation {
            &mut self.marker
        } else {
            &mut self.player
        };
        if let Some(direction) = input.movement {
            body.try_move(direction, dt, move_speed, &arena);
        }
        if let Some(direction) = input.rotation {
            body.rotate(direction, dt, rotate_speed);
        }
        let near = is_near_border(body.pos, &arena);

        self.update_border(near);
        self.sample_trajectory();

        if self.stage == TrialStage::Exploration {
            self.check_targets();
        }
    }

    fn update_border(&mut self, near: bool) {
        if near == self.near_border {
            return;
        }
        self.near_border = near;
        log::debug!("Border proximity: {}", near);
        self.events.push(if near {
            GameEvent::BorderEntered
        } else {
            GameEvent::BorderExited
        });
    }

    fn sample_trajectory(&mut self) {
        let interval = self.config.trajectory_interval;
        if interval <= 0.0 || self.clock < self.next_sample_at {
            return;
        }
        let pos = self.controlled().pos;
        self.trajectory.push(TrajectorySample {
            stage: self.stage,
            t: self.clock - self.trial_started_at,
            x: pos.x,
            y: pos.y,
        });
        self.next_sample_at = self.clock + interval;
    }

    fn check_targets(&mut self) {
        let Some(phase) = self.phase.trial_phase() else {
            return;
        };
        let radius = self.config.target_radius;

        if phase == TrialPhase::Practice {
            let Some(target) = self.targets.collect(self.player.pos, radius) else {
                return;
            };
            self.practice_score += 1;
            log::debug!(
                "Practice target collected ({}/{})",
                self.practice_score,
                self.config.practice_score_goal
            );
            self.events.push(GameEvent::TargetCollected { phase, target });

            if self.practice_score >= self.config.practice_score_goal {
                self.targets.clear();
                self.events.push(GameEvent::PracticeComplete);
            } else {
                self.spawn_practice_target();
            }
        } else if let Some(target) = self.targets.capture(self.player.pos, radius) {
            log::debug!(
                "{} trial {}: target at ({:.2}, {:.2}) found",
                phase,
                self.trial,
                target.pos.x,
                target.pos.y
            );
            self.events.push(GameEvent::TargetCollected { phase, target });
        }
    }

    /// Place the next practice target away from the player
    fn spawn_practice_target(&mut self) {
        let clearance = 2.0 * self.config.target_radius;
        let mut pos = sample_in_arena(&mut self.rng, self.arena.radius);
        for _ in 0..PRACTICE_SPAWN_TRIES {
            if distance(pos, self.player.pos) > clearance {
                break;
            }
            pos = sample_in_arena(&mut self.rng, self.arena.radius);
        }
        self.targets.replace(Target { pos });
    }

    // === Transitions ===

    /// The confirm input: moves the experiment forward from wherever it is
    pub fn advance(&mut self) -> Result<()> {
        match self.phase {
            ExperimentPhase::Welcome => self.show_instructions(1),
            ExperimentPhase::Instructions(screen) => match instruction_action(screen) {
                InstructionAction::Show(next) => self.show_instructions(next),
                InstructionAction::Start(phase) => self.start_phase(phase)?,
                InstructionAction::Finish => self.complete(),
            },
            ExperimentPhase::Practice => {
                if self.practice_score >= self.config.practice_score_goal {
                    self.show_instructions(TrialPhase::Practice.next_instruction());
                } else {
                    log::warn!(
                        "Advance ignored: practice score {}/{}",
                        self.practice_score,
                        self.config.practice_score_goal
                    );
                    self.events.push(GameEvent::AdvanceIgnored);
                }
            }
            ExperimentPhase::Training | ExperimentPhase::DarkTraining => {
                self.finish_trial();
                self.next_trial()?;
            }
            ExperimentPhase::Test => match self.stage {
                TrialStage::Exploration => self.begin_annotation(),
                TrialStage::Annotation => {
                    self.finish_trial();
                    self.begin_feedback();
                }
                TrialStage::Feedback => self.next_trial()?,
            },
            ExperimentPhase::Complete => {}
        }
        Ok(())
    }

    fn enter_phase(&mut self, phase: ExperimentPhase) {
        log::info!("Entering {:?}", phase);
        self.phase = phase;
        self.phase_started_at = self.clock;
        self.events.push(GameEvent::PhaseEntered(phase));
    }

    fn show_instructions(&mut self, screen: u8) {
        self.stage = TrialStage::Exploration;
        self.update_border(false);
        self.enter_phase(ExperimentPhase::Instructions(screen));
    }

    fn start_phase(&mut self, phase: TrialPhase) -> Result<()> {
        self.enter_phase(phase.into());
        self.trial = 1;
        if phase == TrialPhase::Practice {
            self.practice_score = 0;
        }
        self.load_trial(phase)
    }

    /// Reset the player and targets for `self.trial`
    fn load_trial(&mut self, phase: TrialPhase) -> Result<()> {
        self.player.reset();
        self.marker.reset();
        self.stage = TrialStage::Exploration;
        self.annotation_started_at = None;
        self.update_border(false);

        if phase == TrialPhase::Practice {
            self.targets = TargetSet::default();
            self.spawn_practice_target();
        } else {
            let targets = self.table.get(phase, self.trial)?.to_vec();
            self.targets = TargetSet::new(targets);
        }

        self.trial_started_at = self.clock;
        self.trajectory.clear();
        self.next_sample_at = self.clock;

        log::debug!("{} trial {} started", phase, self.trial);
        self.events.push(GameEvent::TrialStarted {
            phase,
            trial: self.trial,
        });
        Ok(())
    }

    fn begin_annotation(&mut self) {
        self.stage = TrialStage::Annotation;
        self.annotation_started_at = Some(self.clock);
        self.marker.reset();
        self.update_border(false);
        self.events.push(GameEvent::AnnotationStarted);
    }

    fn begin_feedback(&mut self) {
        self.stage = TrialStage::Feedback;
        self.update_border(false);
        self.events.push(GameEvent::FeedbackStarted);
    }

    /// Queue the record for the running trial
    fn finish_trial(&mut self) {
        let Some(phase) = self.phase.trial_phase() else {
            return;
        };
        let record = self.trial_record(phase);
        log::info!(
            "{} finished (goal: {:?}, error: {:?})",
            record.trial_info,
            record.encountered_goal,
            record.error_distance
        );
        self.trials_completed += 1;
        self.events.push(GameEvent::Persist(Outbound::Trial(record)));
    }

    fn trial_record(&mut self, phase: TrialPhase) -> TrialRecord {
        let exploration_end = self.annotation_started_at.unwrap_or(self.clock);
        let annotation = self.annotation_started_at.map(|_| self.marker.pos);
        let encountered_goal = self.targets.goal().map(|t| t.pos);
        let error_distance = annotation
            .zip(encountered_goal)
            .map(|(a, g)| distance(a, g));

        TrialRecord {
            participant_id: self.participant.to_string(),
            phase,
            trial: self.trial,
            trial_info: format!("{} {}", phase, self.trial),
            final_position: self.player.pos,
            final_heading: self.player.heading,
            annotation,
            encountered_goal,
            exploration_time: exploration_end - self.trial_started_at,
            annotation_time: self.annotation_started_at.map(|start| self.clock - start),
            error_distance,
            timestamp: self.clock,
            trajectory: std::mem::take(&mut self.trajectory),
        }
    }

    /// Next trial of the phase, or the phase's closing instructions
    fn next_trial(&mut self) -> Result<()> {
        let Some(phase) = self.phase.trial_phase() else {
            return Ok(());
        };
        if self.trial < self.config.trials.for_phase(phase) {
            self.trial += 1;
            self.load_trial(phase)
        } else {
            self.targets = TargetSet::default();
            self.show_instructions(phase.next_instruction());
            Ok(())
        }
    }

    fn complete(&mut self) {
        self.targets = TargetSet::default();
        self.enter_phase(ExperimentPhase::Complete);
        let summary = SessionSummary {
            participant_id: self.participant.to_string(),
            trials_completed: self.trials_completed,
            practice_score: self.practice_score,
            total_time: self.clock,
        };
        log::info!(
            "Experiment complete: {} trials in {:.1}s",
            summary.trials_completed,
            summary.total_time
        );
        self.events.push(GameEvent::Persist(Outbound::Session(summary)));
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;

    fn state() -> ExperimentState {
        let id = ParticipantId::parse("P01").unwrap();
        ExperimentState::with_defaults(id, 1).unwrap()
    }

    #[test]
    fn test_participant_id_rules() {
        assert!(matches!(
            ParticipantId::parse("   "),
            Err(ExperimentError::MissingParticipant)
        ));
        assert!(matches!(
            ParticipantId::parse("a b"),
            Err(ExperimentError::InvalidParticipant(_))
        ));
        assert!(ParticipantId::parse(&"x".repeat(65)).is_err());
        assert_eq!(ParticipantId::parse(" jd-42 ").unwrap().as_str(), "jd-42");
    }

    #[test]
    fn test_instruction_table() {
        assert_eq!(instruction_action(1), InstructionAction::Show(2));
        assert_eq!(
            instruction_action(2),
            InstructionAction::Start(TrialPhase::Practice)
        );
        assert_eq!(
            instruction_action(5),
            InstructionAction::Start(TrialPhase::Test)
        );
        assert_eq!(instruction_action(6), InstructionAction::Finish);
        for phase in [
            TrialPhase::Practice,
            TrialPhase::Training,
            TrialPhase::DarkTraining,
        ] {
            assert_eq!(
                instruction_action(phase.next_instruction()),
                InstructionAction::Start(match phase {
                    TrialPhase::Practice => TrialPhase::Training,
                    TrialPhase::Training => TrialPhase::DarkTraining,
                    _ => TrialPhase::Test,
                })
            );
        }
    }

    #[test]
    fn test_welcome_to_practice() {
        let mut s = state();
        assert_eq!(s.phase(), ExperimentPhase::Welcome);
        s.advance().unwrap();
        assert_eq!(s.phase(), ExperimentPhase::Instructions(1));
        s.advance().unwrap();
        assert_eq!(s.phase(), ExperimentPhase::Instructions(2));
        s.advance().unwrap();
        assert_eq!(s.phase(), ExperimentPhase::Practice);
        assert_eq!(s.targets().active().len(), 1);
        assert_eq!(*s.player(), PlayerState::default());

        let events = s.drain_events();
        assert!(events.contains(&GameEvent::TrialStarted {
            phase: TrialPhase::Practice,
            trial: 1
        }));
        assert!(s.drain_events().is_empty());
    }

    #[test]
    fn test_missing_table_entry_rejected_at_start() {
        let mut table = TargetTable::standard();
        table.insert(TrialPhase::Test, 5, Vec::new());
        let id = ParticipantId::parse("P01").unwrap();
        let err = ExperimentState::new(id, ExperimentConfig::default(), table, 1).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::MissingTrial {
                phase: TrialPhase::Test,
                trial: 5
            }
        ));
    }

    #[test]
    fn test_nothing_visible_before_practice() {
        let s = state();
        assert!(s.visible_targets().is_empty());
        assert!(!s.snapshot().shows_arena());
        assert!(!s.accepts_movement());
    }

    fn enter_practice(s: &mut ExperimentState) {
        for _ in 0..3 {
            s.advance().unwrap();
        }
        assert_eq!(s.phase(), ExperimentPhase::Practice);
        s.drain_events();
    }

    #[test]
    fn test_practice_target_under_player_needs_reentry() {
        let mut s = state();
        enter_practice(&mut s);
        let idle = TickInput::default();

        s.targets = TargetSet::new(vec![Target { pos: s.player.pos }]);
        s.update(&idle, 0.016);
        assert_eq!(s.practice_score(), 1);

        // Respawn right where the player stands
        s.targets.replace(Target { pos: s.player.pos });
        for _ in 0..10 {
            s.update(&idle, 0.016);
        }
        assert_eq!(s.practice_score(), 1);
        assert!(
            !s.drain_events()
                .iter()
                .any(|e| matches!(e, GameEvent::TargetCollected { .. }))
        );
    }

    #[test]
    fn test_practice_respawn_clears_player() {
        let mut s = state();
        enter_practice(&mut s);
        let clearance = 2.0 * s.config.target_radius;
        for i in 0..200 {
            let angle = i as f64 * 0.37;
            s.player.pos = DVec2::new(angle.sin(), angle.cos()) * 0.8;
            s.spawn_practice_target();
            let target = s.targets.active()[0];
            assert!(distance(target.pos, s.player.pos) > clearance);
            assert!(target.pos.length() <= s.arena.radius);
        }
    }

    #[test]
    fn test_advance_after_complete_is_noop() {
        let mut s = state();
        s.phase = ExperimentPhase::Complete;
        s.advance().unwrap();
        assert!(s.is_complete());
        assert!(s.drain_events().is_empty());
    }
}
