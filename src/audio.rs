//! Audio cues using Web Audio API
//!
//! Procedurally generated tones, no sound files needed. The border beep
//! loops for as long as the player stays in the border band.

use crate::sim::GameEvent;

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Start the looping border beep
    BorderBeepStart,
    /// Silence the border beep
    BorderBeepStop,
    /// Player entered a target
    TargetFound,
    /// Practice goal reached
    PracticeComplete,
    /// Test trial switched to annotation
    AnnotationStart,
}

impl SoundEffect {
    /// Cue for a simulation event, if any
    pub fn for_event(event: &GameEvent) -> Option<Self> {
        match event {
            GameEvent::BorderEntered => Some(SoundEffect::BorderBeepStart),
            GameEvent::BorderExited => Some(SoundEffect::BorderBeepStop),
            GameEvent::TargetCollected { .. } => Some(SoundEffect::TargetFound),
            GameEvent::PracticeComplete => Some(SoundEffect::PracticeComplete),
            GameEvent::AnnotationStarted => Some(SoundEffect::AnnotationStart),
            // Leaving a trial must not leave the beep running
            GameEvent::PhaseEntered(_) | GameEvent::TrialStarted { .. } => {
                Some(SoundEffect::BorderBeepStop)
            }
            _ => None,
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::AudioManager;

#[cfg(target_arch = "wasm32")]
mod web {
    use web_sys::{AudioContext, GainNode, OscillatorNode, OscillatorType};

    use super::SoundEffect;

    /// Output level for every cue
    const VOLUME: f32 = 0.8;

    /// Audio manager for the experiment
    pub struct AudioManager {
        ctx: Option<AudioContext>,
        /// Running border beep, if any
        beep: Option<(OscillatorNode, GainNode)>,
    }

    impl Default for AudioManager {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioManager {
        pub fn new() -> Self {
            // May fail outside a secure context
            let ctx = AudioContext::new().ok();
            if ctx.is_none() {
                log::warn!("Failed to create AudioContext - audio disabled");
            }
            Self { ctx, beep: None }
        }

        /// Resume audio context (required after user gesture)
        pub fn resume(&self) {
            if let Some(ctx) = &self.ctx {
                let _ = ctx.resume();
            }
        }

        /// Play a sound effect
        pub fn play(&mut self, effect: SoundEffect) {
            if effect == SoundEffect::BorderBeepStop {
                self.stop_beep();
                return;
            }

            let Some(ctx) = self.ctx.clone() else { return };

            // Browsers suspend the context until a user gesture
            if ctx.state() == web_sys::AudioContextState::Suspended {
                let _ = ctx.resume();
            }

            let vol = VOLUME;
            match effect {
                SoundEffect::BorderBeepStart => self.start_beep(&ctx, vol),
                SoundEffect::TargetFound => self.play_target(&ctx, vol),
                SoundEffect::PracticeComplete => self.play_practice_complete(&ctx, vol),
                SoundEffect::AnnotationStart => self.play_annotation(&ctx, vol),
                SoundEffect::BorderBeepStop => {}
            }
        }

        // === Sound generators ===

        /// Create an oscillator with gain envelope
        fn create_osc(
            &self,
            ctx: &AudioContext,
            freq: f32,
            osc_type: OscillatorType,
        ) -> Option<(OscillatorNode, GainNode)> {
            let osc = ctx.create_oscillator().ok()?;
            let gain = ctx.create_gain().ok()?;

            osc.set_type(osc_type);
            osc.frequency().set_value(freq);
            osc.connect_with_audio_node(&gain).ok()?;
            gain.connect_with_audio_node(&ctx.destination()).ok()?;

            Some((osc, gain))
        }

        /// Border beep - pulsing square tone until stopped
        fn start_beep(&mut self, ctx: &AudioContext, vol: f32) {
            if self.beep.is_some() {
                return;
            }
            let Some((osc, gain)) = self.create_osc(ctx, 880.0, OscillatorType::Square) else {
                return;
            };
            let t = ctx.current_time();

            // 4 Hz on/off pulse, scheduled a minute ahead
            for i in 0..240 {
                let start = t + i as f64 * 0.25;
                gain.gain().set_value_at_time(vol * 0.15, start).ok();
                gain.gain().set_value_at_time(0.0, start + 0.12).ok();
            }

            osc.start().ok();
            self.beep = Some((osc, gain));
        }

        fn stop_beep(&mut self) {
            if let Some((osc, gain)) = self.beep.take() {
                gain.gain().cancel_scheduled_values(0.0).ok();
                gain.gain().set_value(0.0);
                osc.stop().ok();
            }
        }

        /// Target found - bright two-note chime
        fn play_target(&self, ctx: &AudioContext, vol: f32) {
            for (i, freq) in [660.0, 990.0].iter().enumerate() {
                let delay = i as f64 * 0.1;
                if let Some((osc, gain)) = self.create_osc(ctx, *freq, OscillatorType::Sine) {
                    let t = ctx.current_time() + delay;
                    gain.gain().set_value_at_time(vol * 0.3, t).ok();
                    gain.gain()
                        .exponential_ramp_to_value_at_time(0.01, t + 0.25)
                        .ok();
                    osc.start_with_when(t).ok();
                    osc.stop_with_when(t + 0.3).ok();
                }
            }
        }

        /// Practice complete - rising fanfare
        fn play_practice_complete(&self, ctx: &AudioContext, vol: f32) {
            for (i, freq) in [400.0, 500.0, 600.0, 800.0].iter().enumerate() {
                let delay = i as f64 * 0.1;
                if let Some((osc, gain)) = self.create_osc(ctx, *freq, OscillatorType::Triangle) {
                    let t = ctx.current_time() + delay;
                    gain.gain().set_value_at_time(vol * 0.3, t).ok();
                    gain.gain()
                        .exponential_ramp_to_value_at_time(0.01, t + 0.4)
                        .ok();
                    osc.start_with_when(t).ok();
                    osc.stop_with_when(t + 0.5).ok();
                }
            }
        }

        /// Annotation start - soft low tone
        fn play_annotation(&self, ctx: &AudioContext, vol: f32) {
            let Some((osc, gain)) = self.create_osc(ctx, 300.0, OscillatorType::Sine) else {
                return;
            };
            let t = ctx.current_time();

            gain.gain().set_value_at_time(vol * 0.25, t).ok();
            gain.gain()
                .exponential_ramp_to_value_at_time(0.01, t + 0.3)
                .ok();
            osc.frequency().set_value_at_time(300.0, t).ok();
            osc.frequency()
                .exponential_ramp_to_value_at_time(200.0, t + 0.3)
                .ok();

            osc.start().ok();
            osc.stop_with_when(t + 0.35).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ExperimentPhase, Target, TrialPhase};

    #[test]
    fn test_border_edges_toggle_beep() {
        assert_eq!(
            SoundEffect::for_event(&GameEvent::BorderEntered),
            Some(SoundEffect::BorderBeepStart)
        );
        assert_eq!(
            SoundEffect::for_event(&GameEvent::BorderExited),
            Some(SoundEffect::BorderBeepStop)
        );
    }

    #[test]
    fn test_phase_change_silences_beep() {
        assert_eq!(
            SoundEffect::for_event(&GameEvent::PhaseEntered(ExperimentPhase::Instructions(4))),
            Some(SoundEffect::BorderBeepStop)
        );
    }

    #[test]
    fn test_collection_plays_in_every_phase() {
        for phase in [
            TrialPhase::Practice,
            TrialPhase::Training,
            TrialPhase::DarkTraining,
            TrialPhase::Test,
        ] {
            let event = GameEvent::TargetCollected {
                phase,
                target: Target::new(0.5, 0.5),
            };
            assert_eq!(
                SoundEffect::for_event(&event),
                Some(SoundEffect::TargetFound)
            );
        }
    }

    #[test]
    fn test_silent_events() {
        assert_eq!(SoundEffect::for_event(&GameEvent::AdvanceIgnored), None);
        assert_eq!(SoundEffect::for_event(&GameEvent::FeedbackStarted), None);
    }
}
