//! Adaptive ON/OFF detection
//!
//! Two independent detectors decide whether the compressor is running:
//!
//! - `EnergyDetector`: piezo window RMS against a learned idle baseline
//! - `TrendDetector`: temperature slope against a learned idle slope
//!
//! Both share the same building blocks: a `Hysteresis` counter that needs N
//! consecutive agreeing votes before flipping state, and a
//! `DetectorBaseline` that learns the idle level by EMA and survives
//! restarts through the store.

mod energy;
mod persisted;
mod trend;

pub use energy::{window_rms, EnergyDetector};
pub use persisted::DetectorBaseline;
pub use trend::TrendDetector;

use serde::{Deserialize, Serialize};

/// Believed compressor state from one detector's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionState {
    #[default]
    Off,
    On,
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "OFF"),
            Self::On => write!(f, "ON"),
        }
    }
}

/// One measurement's opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    On,
    Off,
    /// No evidence either way; resets both counters
    Neutral,
}

/// A confirmed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    TurnedOn,
    TurnedOff,
}

impl Transition {
    pub fn new_state(self) -> DetectionState {
        match self {
            Self::TurnedOn => DetectionState::On,
            Self::TurnedOff => DetectionState::Off,
        }
    }
}

/// Consecutive-vote hysteresis.
///
/// Invariant: at most one of the two counters is non-zero, and both are
/// zero right after a transition.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    state: DetectionState,
    on_counter: u32,
    off_counter: u32,
    required: u32,
}

impl Hysteresis {
    pub fn new(required: u32) -> Self {
        Self {
            state: DetectionState::Off,
            on_counter: 0,
            off_counter: 0,
            required: required.max(1),
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn counters(&self) -> (u32, u32) {
        (self.on_counter, self.off_counter)
    }

    /// Feed one vote; returns the transition it completed, if any.
    pub fn vote(&mut self, vote: Vote) -> Option<Transition> {
        match (self.state, vote) {
            (_, Vote::Neutral) => {
                self.on_counter = 0;
                self.off_counter = 0;
                None
            }
            (DetectionState::Off, Vote::On) => {
                self.on_counter += 1;
                self.off_counter = 0;
                self.complete_if_reached(self.on_counter, Transition::TurnedOn)
            }
            (DetectionState::Off, Vote::Off) => {
                self.on_counter = 0;
                None
            }
            (DetectionState::On, Vote::Off) => {
                self.off_counter += 1;
                self.on_counter = 0;
                self.complete_if_reached(self.off_counter, Transition::TurnedOff)
            }
            (DetectionState::On, Vote::On) => {
                self.off_counter = 0;
                None
            }
        }
    }

    fn complete_if_reached(&mut self, count: u32, transition: Transition) -> Option<Transition> {
        if count < self.required {
            return None;
        }
        self.state = transition.new_state();
        self.on_counter = 0;
        self.off_counter = 0;
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_exactly_n_consecutive_votes() {
        let mut h = Hysteresis::new(3);
        assert_eq!(h.vote(Vote::On), None);
        assert_eq!(h.vote(Vote::On), None);
        assert_eq!(h.state(), DetectionState::Off);
        assert_eq!(h.vote(Vote::On), Some(Transition::TurnedOn));
        assert_eq!(h.state(), DetectionState::On);
        assert_eq!(h.counters(), (0, 0));
    }

    #[test]
    fn test_disagreeing_vote_restarts_the_count() {
        let mut h = Hysteresis::new(3);
        h.vote(Vote::On);
        h.vote(Vote::On);
        h.vote(Vote::Off);
        assert_eq!(h.counters(), (0, 0));
        h.vote(Vote::On);
        h.vote(Vote::On);
        assert_eq!(h.state(), DetectionState::Off);
        assert_eq!(h.vote(Vote::On), Some(Transition::TurnedOn));
    }

    #[test]
    fn test_neutral_resets_both_counters() {
        let mut h = Hysteresis::new(4);
        for _ in 0..3 {
            h.vote(Vote::On);
        }
        assert_eq!(h.vote(Vote::Neutral), None);
        assert_eq!(h.counters(), (0, 0));
    }

    #[test]
    fn test_symmetric_off_transition() {
        let mut h = Hysteresis::new(4);
        for _ in 0..4 {
            h.vote(Vote::On);
        }
        assert_eq!(h.state(), DetectionState::On);

        for _ in 0..3 {
            assert_eq!(h.vote(Vote::Off), None);
        }
        assert_eq!(h.counters(), (0, 3));
        assert_eq!(h.vote(Vote::Off), Some(Transition::TurnedOff));
        assert_eq!(h.counters(), (0, 0));
    }

    #[test]
    fn test_at_most_one_counter_nonzero() {
        let mut h = Hysteresis::new(5);
        let votes = [
            Vote::On, Vote::Off, Vote::On, Vote::On, Vote::Neutral, Vote::On, Vote::On,
            Vote::On, Vote::On, Vote::On, Vote::Off, Vote::On, Vote::Off, Vote::Off,
        ];
        for v in votes {
            h.vote(v);
            let (on, off) = h.counters();
            assert!(on == 0 || off == 0, "on={on} off={off}");
        }
    }
}
