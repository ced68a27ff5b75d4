//! Variable timestep simulation tick
//!
//! One call per animation frame with the real elapsed seconds since the
//! previous frame. Movement is applied before the advance input so a key
//! held across an advance still moves the player in the trial it was held in.

use serde::{Deserialize, Serialize};

use super::player::{MoveDirection, RotateDirection};
use super::state::{ExperimentState, GameEvent};
use crate::error::Result;

/// Commands for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInput {
    /// Held movement key, if any
    pub movement: Option<MoveDirection>,
    /// Held rotation key, if any
    pub rotation: Option<RotateDirection>,
    /// Confirm pressed since the last frame
    pub advance: bool,
}

/// Advance the experiment by `dt` seconds and return the resulting events
pub fn tick(state: &mut ExperimentState, input: &TickInput, dt: f64) -> Result<Vec<GameEvent>> {
    state.update(input, dt);
    if input.advance {
        state.advance()?;
    }
    Ok(state.drain_events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{MOVE_SPEED, ROTATE_SPEED};
    use crate::sim::{
        ExperimentPhase, Outbound, ParticipantId, PlayerState, Target, TrialPhase, TrialRecord,
        TrialStage,
    };
    use crate::{direction_to_heading, shortest_angle_delta};
    use glam::DVec2;

    const ADVANCE: TickInput = TickInput {
        movement: None,
        rotation: None,
        advance: true,
    };

    fn new_state(seed: u64) -> ExperimentState {
        let id = ParticipantId::parse("tester").unwrap();
        ExperimentState::with_defaults(id, seed).unwrap()
    }

    /// Turn toward `goal`, then drive there in one step
    fn walk_to(state: &mut ExperimentState, goal: DVec2) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let from = state.controlled().pos;
        if from.distance(goal) < 1e-12 {
            return events;
        }

        let turn = shortest_angle_delta(state.controlled().heading, direction_to_heading(from, goal));
        let rotation = if turn >= 0.0 {
            RotateDirection::Right
        } else {
            RotateDirection::Left
        };
        let rotate = TickInput {
            rotation: Some(rotation),
            ..Default::default()
        };
        events.extend(tick(state, &rotate, turn.abs() / ROTATE_SPEED).unwrap());

        let forward = TickInput {
            movement: Some(MoveDirection::Forward),
            ..Default::default()
        };
        events.extend(tick(state, &forward, from.distance(goal) / MOVE_SPEED).unwrap());
        events
    }

    fn press_advance(state: &mut ExperimentState) -> Vec<GameEvent> {
        tick(state, &ADVANCE, 0.016).unwrap()
    }

    fn records(events: &[GameEvent]) -> Vec<TrialRecord> {
        events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Persist(Outbound::Trial(r)) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn enter_practice(state: &mut ExperimentState) {
        for _ in 0..3 {
            press_advance(state);
        }
        assert_eq!(state.phase(), ExperimentPhase::Practice);
    }

    fn finish_practice(state: &mut ExperimentState) {
        let mut guard = 0;
        while state.practice_score() < 5 {
            let target = state.visible_targets()[0];
            walk_to(state, target.pos);
            guard += 1;
            assert!(guard < 20, "practice did not converge");
        }
        press_advance(state);
        assert_eq!(state.phase(), ExperimentPhase::Instructions(3));
    }

    fn enter_phase(state: &mut ExperimentState, phase: TrialPhase) {
        enter_practice(state);
        if phase == TrialPhase::Practice {
            return;
        }
        finish_practice(state);
        for next in [TrialPhase::Training, TrialPhase::DarkTraining, TrialPhase::Test] {
            press_advance(state);
            assert_eq!(state.phase(), ExperimentPhase::from(next));
            if next == phase {
                return;
            }
            while state.phase() == ExperimentPhase::from(next) {
                press_advance(state);
            }
        }
    }

    #[test]
    fn test_practice_requires_score_goal() {
        let mut state = new_state(11);
        enter_practice(&mut state);

        let events = press_advance(&mut state);
        assert_eq!(state.phase(), ExperimentPhase::Practice);
        assert!(events.contains(&GameEvent::AdvanceIgnored));

        let is_collection = |e: &GameEvent| matches!(e, GameEvent::TargetCollected { .. });
        let mut collected = 0;
        while state.practice_score() < 5 {
            let target = state.visible_targets()[0];
            collected += walk_to(&mut state, target.pos)
                .iter()
                .filter(|e| is_collection(e))
                .count();
            if state.practice_score() < 5 {
                let events = press_advance(&mut state);
                collected += events.iter().filter(|e| is_collection(e)).count();
                assert_eq!(state.phase(), ExperimentPhase::Practice);
            }
        }
        assert_eq!(collected, 5);
        assert!(state.visible_targets().is_empty());

        press_advance(&mut state);
        assert_eq!(state.phase(), ExperimentPhase::Instructions(3));
    }

    #[test]
    fn test_practice_seed_is_reproducible() {
        let mut a = new_state(99);
        let mut b = new_state(99);
        enter_practice(&mut a);
        enter_practice(&mut b);
        assert_eq!(a.visible_targets(), b.visible_targets());
    }

    #[test]
    fn test_training_trial_sequence() {
        let mut state = new_state(3);
        enter_phase(&mut state, TrialPhase::Training);

        for trial in 1..=3 {
            assert_eq!(state.phase(), ExperimentPhase::Training);
            assert_eq!(state.trial(), trial);
            assert_eq!(*state.player(), PlayerState::default());

            let goal = state.visible_targets()[0];
            let events = walk_to(&mut state, goal.pos);
            assert!(events.contains(&GameEvent::TargetCollected {
                phase: TrialPhase::Training,
                target: goal
            }));

            let events = press_advance(&mut state);
            let recs = records(&events);
            assert_eq!(recs.len(), 1);
            assert_eq!(recs[0].trial, trial);
            assert_eq!(recs[0].encountered_goal, Some(goal.pos));
            assert_eq!(recs[0].annotation, None);
            assert_eq!(recs[0].error_distance, None);
        }
        assert_eq!(state.phase(), ExperimentPhase::Instructions(4));
    }

    #[test]
    fn test_capture_collapses_visible_targets() {
        let mut state = new_state(3);
        enter_phase(&mut state, TrialPhase::Training);
        assert_eq!(state.visible_targets().len(), 3);

        let second = state.visible_targets()[1];
        walk_to(&mut state, second.pos);
        assert_eq!(state.visible_targets(), &[second]);
    }

    #[test]
    fn test_dark_training_shows_targets_near_border() {
        let mut state = new_state(5);
        enter_phase(&mut state, TrialPhase::DarkTraining);
        assert!(state.visible_targets().is_empty());

        let events = walk_to(&mut state, DVec2::new(0.0, 1.6));
        assert!(events.contains(&GameEvent::BorderEntered));
        assert!(state.near_border());
        assert_eq!(state.visible_targets().len(), 3);

        let events = walk_to(&mut state, DVec2::new(0.0, 0.5));
        assert!(events.contains(&GameEvent::BorderExited));
        assert!(state.visible_targets().is_empty());
    }

    #[test]
    fn test_test_trial_annotation_flow() {
        let mut state = new_state(8);
        enter_phase(&mut state, TrialPhase::Test);
        assert!(state.visible_targets().is_empty());

        // Test 1 targets: (0.5, 1.0), (-0.8, -0.2), (0.7, -0.7)
        let first = Target::new(0.5, 1.0);
        let other = Target::new(-0.8, -0.2);
        walk_to(&mut state, first.pos);
        // Entering a second target must not replace the goal
        walk_to(&mut state, other.pos);
        assert_eq!(state.targets().goal(), Some(first));

        let events = press_advance(&mut state);
        assert!(events.contains(&GameEvent::AnnotationStarted));
        assert_eq!(state.stage(), TrialStage::Annotation);
        assert_eq!(state.controlled().pos, DVec2::ZERO);

        // Annotate 0.1 m short of the goal
        walk_to(&mut state, DVec2::new(0.5, 0.9));
        assert!((state.player().pos - other.pos).length() < 1e-9);

        let events = press_advance(&mut state);
        assert_eq!(state.stage(), TrialStage::Feedback);
        assert_eq!(state.visible_targets(), &[first]);
        let rec = &records(&events)[0];
        assert_eq!(rec.trial_info, "test 1");
        assert_eq!(rec.encountered_goal, Some(first.pos));
        assert!((rec.error_distance.unwrap() - 0.1).abs() < 1e-9);
        assert!(rec.annotation_time.unwrap() > 0.0);
        assert!(rec.exploration_time > 0.0);

        press_advance(&mut state);
        assert_eq!(state.trial(), 2);
        assert_eq!(state.stage(), TrialStage::Exploration);
        assert_eq!(state.targets().goal(), None);
    }

    #[test]
    fn test_test_trial_without_goal() {
        let mut state = new_state(8);
        enter_phase(&mut state, TrialPhase::Test);
        press_advance(&mut state);
        let rec = records(&press_advance(&mut state)).remove(0);
        assert_eq!(rec.encountered_goal, None);
        assert_eq!(rec.error_distance, None);
        assert_eq!(rec.annotation, Some(DVec2::ZERO));
    }

    #[test]
    fn test_movement_frozen_in_feedback() {
        let mut state = new_state(8);
        enter_phase(&mut state, TrialPhase::Test);
        press_advance(&mut state);
        press_advance(&mut state);
        assert_eq!(state.stage(), TrialStage::Feedback);

        let before = *state.marker();
        let input = TickInput {
            movement: Some(MoveDirection::Forward),
            ..Default::default()
        };
        tick(&mut state, &input, 0.5).unwrap();
        assert_eq!(*state.marker(), before);
        assert_eq!(*state.player(), PlayerState::default());
    }

    #[test]
    fn test_frame_rate_independent() {
        let mut coarse = new_state(2);
        let mut fine = new_state(2);
        enter_phase(&mut coarse, TrialPhase::Training);
        enter_phase(&mut fine, TrialPhase::Training);

        let input = TickInput {
            movement: Some(MoveDirection::Forward),
            rotation: None,
            advance: false,
        };
        tick(&mut coarse, &input, 1.0).unwrap();
        for _ in 0..100 {
            tick(&mut fine, &input, 0.01).unwrap();
        }
        assert!((coarse.player().pos - fine.player().pos).length() < 1e-9);
        assert!((coarse.player().pos - DVec2::new(0.0, 1.0)).length() < 1e-9);
    }

    #[test]
    fn test_advance_and_move_same_frame() {
        let mut state = new_state(4);
        enter_phase(&mut state, TrialPhase::Training);

        let input = TickInput {
            movement: Some(MoveDirection::Forward),
            rotation: None,
            advance: true,
        };
        let events = tick(&mut state, &input, 0.5).unwrap();
        let rec = &records(&events)[0];
        assert!((rec.final_position - DVec2::new(0.0, 0.5)).length() < 1e-12);
        assert_eq!(state.trial(), 2);
        assert_eq!(state.player().pos, DVec2::ZERO);
    }

    #[test]
    fn test_trajectory_sampled() {
        let mut state = new_state(6);
        enter_phase(&mut state, TrialPhase::Training);
        let input = TickInput {
            rotation: Some(RotateDirection::Right),
            ..Default::default()
        };
        for _ in 0..60 {
            tick(&mut state, &input, 1.0 / 60.0).unwrap();
        }
        let rec = records(&press_advance(&mut state)).remove(0);
        // 1 s of frames at ~0.1 s spacing
        assert!((8..=11).contains(&rec.trajectory.len()), "{}", rec.trajectory.len());
        assert!(rec.trajectory.iter().all(|s| s.stage == TrialStage::Exploration));
    }

    #[test]
    fn test_full_session() {
        let mut state = new_state(2024);
        let mut persisted = Vec::new();

        enter_practice(&mut state);
        finish_practice(&mut state);

        let mut guard = 0;
        while !state.is_complete() {
            guard += 1;
            assert!(guard < 100, "session did not finish");

            if state.phase() == ExperimentPhase::Training && state.stage() == TrialStage::Exploration
            {
                let goal = state.visible_targets()[0];
                persisted.extend(walk_to(&mut state, goal.pos));
            }
            persisted.extend(press_advance(&mut state));
        }

        let outbound: Vec<_> = persisted
            .into_iter()
            .filter_map(|e| match e {
                GameEvent::Persist(o) => Some(o),
                _ => None,
            })
            .collect();
        assert_eq!(outbound.len(), 3 + 2 + 5 + 1);
        match outbound.last() {
            Some(Outbound::Session(summary)) => {
                assert_eq!(summary.trials_completed, 10);
                assert_eq!(summary.practice_score, 5);
                assert_eq!(summary.participant_id, "tester");
            }
            other => panic!("expected session summary, got {other:?}"),
        }

        // Nothing happens after completion
        assert!(press_advance(&mut state).is_empty());
    }
}
