//! Time source for the control loop.
//!
//! The controller never reads wall time directly. `TickClock` is advanced by
//! the driver by exactly the delay each step asked for, so simulated and
//! replayed runs are deterministic regardless of how fast they execute.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Time elapsed since the clock started.
    fn now(&self) -> Duration;

    /// Account for a completed tick delay. Real clocks ignore this.
    fn advance(&self, _by: Duration) {}

    /// Wall-clock timestamp used for records.
    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Virtual clock driven by the control loop.
#[derive(Debug)]
pub struct TickClock {
    origin: DateTime<Utc>,
    elapsed_us: AtomicU64,
}

impl TickClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// A clock whose `wall()` starts at `origin`.
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            elapsed_us: AtomicU64::new(0),
        }
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.elapsed_us.load(Ordering::Acquire))
    }

    fn advance(&self, by: Duration) {
        let us = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_us.fetch_add(us, Ordering::AcqRel);
    }

    fn wall(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.now())
            .ok()
            .and_then(|d| self.origin.checked_add_signed(d))
            .unwrap_or(self.origin)
    }
}

/// Real monotonic time.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
