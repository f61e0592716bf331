//! Two-phase stability poll as a pure state machine.
//!
//! The controller owns the interval timer and feeds one [`Observation`] per
//! tick; [`PollState::step`] decides the next phase.

use crate::config::{PollPhaseConfig, Timings};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollState {
    Idle,
    FastPoll { started_ms: f64, stable: u32 },
    SlowPoll { started_ms: f64, stable: u32 },
    Stopped,
}

/// Result of comparing applied and desired columns on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    GridMissing,
    /// Out of date; the update path was run.
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTransition {
    Stay,
    EnterSlow,
    /// Slow phase satisfied; caller performs the final forced update.
    Finish,
}

impl PollState {
    pub fn start(now_ms: f64) -> Self {
        PollState::FastPoll {
            started_ms: now_ms,
            stable: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PollState::FastPoll { .. } | PollState::SlowPoll { .. })
    }

    /// Phase parameters for the current state, `None` when not polling.
    pub fn phase<'a>(&self, timings: &'a Timings) -> Option<&'a PollPhaseConfig> {
        match self {
            PollState::FastPoll { .. } => Some(&timings.fast_poll),
            PollState::SlowPoll { .. } => Some(&timings.slow_poll),
            PollState::Idle | PollState::Stopped => None,
        }
    }

    pub fn step(self, now_ms: f64, observation: Observation, timings: &Timings) -> (PollState, PollTransition) {
        match self {
            PollState::FastPoll { started_ms, stable } => {
                let stable = next_stable(stable, observation);
                if phase_done(&timings.fast_poll, started_ms, stable, now_ms) {
                    let next = PollState::SlowPoll {
                        started_ms: now_ms,
                        stable: 0,
                    };
                    (next, PollTransition::EnterSlow)
                } else {
                    (PollState::FastPoll { started_ms, stable }, PollTransition::Stay)
                }
            }
            PollState::SlowPoll { started_ms, stable } => {
                let stable = next_stable(stable, observation);
                if phase_done(&timings.slow_poll, started_ms, stable, now_ms) {
                    (PollState::Stopped, PollTransition::Finish)
                } else {
                    (PollState::SlowPoll { started_ms, stable }, PollTransition::Stay)
                }
            }
            PollState::Idle | PollState::Stopped => (self, PollTransition::Stay),
        }
    }
}

fn next_stable(stable: u32, observation: Observation) -> u32 {
    match observation {
        Observation::Changed => 0,
        Observation::Unchanged => stable.saturating_add(1),
        Observation::GridMissing => stable,
    }
}

fn phase_done(phase: &PollPhaseConfig, started_ms: f64, stable: u32, now_ms: f64) -> bool {
    stable >= phase.stable_ticks || now_ms - started_ms >= phase.ceiling_ms as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_phase_ends_after_exact_stable_count() {
        let timings = Timings::default();
        let mut state = PollState::start(0.0);
        for tick in 1..timings.fast_poll.stable_ticks {
            let (next, tr) = state.step(tick as f64 * 200.0, Observation::Unchanged, &timings);
            assert_eq!(tr, PollTransition::Stay, "tick {tick}");
            state = next;
        }
        let (next, tr) = state.step(1_000.0, Observation::Unchanged, &timings);
        assert_eq!(tr, PollTransition::EnterSlow);
        assert_eq!(
            next,
            PollState::SlowPoll {
                started_ms: 1_000.0,
                stable: 0
            }
        );
    }

    #[test]
    fn changes_reset_the_counter() {
        let timings = Timings::default();
        let state = PollState::FastPoll {
            started_ms: 0.0,
            stable: 4,
        };
        let (state, tr) = state.step(1_000.0, Observation::Changed, &timings);
        assert_eq!(tr, PollTransition::Stay);
        assert_eq!(
            state,
            PollState::FastPoll {
                started_ms: 0.0,
                stable: 0
            }
        );
        let (state, _) = state.step(1_200.0, Observation::GridMissing, &timings);
        assert!(matches!(state, PollState::FastPoll { stable: 0, .. }));
    }

    #[test]
    fn ceiling_forces_transition() {
        let timings = Timings::default();
        let state = PollState::start(0.0);
        let (_, tr) = state.step(4_800.0, Observation::Changed, &timings);
        assert_eq!(tr, PollTransition::Stay);
        let (state, tr) = state.step(5_000.0, Observation::Changed, &timings);
        assert_eq!(tr, PollTransition::EnterSlow);
        let (state, tr) = state.step(30_000.0, Observation::GridMissing, &timings);
        assert_eq!((state, tr), (PollState::Stopped, PollTransition::Finish));
    }

    #[test]
    fn stopped_never_restarts() {
        let timings = Timings::default();
        let (state, tr) = PollState::Stopped.step(1.0e9, Observation::Unchanged, &timings);
        assert_eq!((state, tr), (PollState::Stopped, PollTransition::Stay));
        assert!(!state.is_active());
        assert!(state.phase(&timings).is_none());
    }
}
