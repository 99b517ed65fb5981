//! Duty-cycle state machine and its driver
//!
//! `CycleController` walks Idle → Collecting → Analyzing → Resting → Idle.
//! Each `step` performs one tick of work against a `ControlContext` and
//! returns how long to wait before the next one; `runner::run_control_loop`
//! owns the waiting and forwards queued notifications to the bridge.

mod clock;
mod context;
mod controller;
pub mod runner;

pub use clock::{Clock, MonotonicClock, TickClock};
pub use context::ControlContext;
pub use controller::CycleController;
pub use runner::{run_control_loop, RunSummary, RunnerSettings, StopReason};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Compressor off, watching for start-up
    #[default]
    Idle,
    /// Compressor running, sampling vibration and temperature
    Collecting,
    /// Scoring the completed cycle (one step)
    Analyzing,
    /// Cycle scored, waiting for the compressor to stop
    Resting,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Collecting => write!(f, "collecting"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Resting => write!(f, "resting"),
        }
    }
}
