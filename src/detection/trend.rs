//! Temperature-trend detector.

use std::collections::VecDeque;
use std::time::Duration;

use super::{DetectionState, DetectorBaseline, Hysteresis, Transition, Vote};
use crate::config::{defaults, TrendDetectorConfig};
use crate::statistics::temperature_slope;
use crate::storage::{keys, Store};

/// Decides ON/OFF from the direction of the temperature trend.
///
/// Keeps a sliding window of recent readings. Once the window is full, every
/// `evaluate_every` readings the window slope is compared against the
/// learned idle slope: a rise beyond the deadband votes ON, a fall beyond it
/// votes OFF, anything in between resets the counters.
pub struct TrendDetector {
    config: TrendDetectorConfig,
    readings: VecDeque<f64>,
    since_evaluation: usize,
    hysteresis: Hysteresis,
    baseline: DetectorBaseline,
    last_delta: Option<f64>,
}

impl TrendDetector {
    pub fn new(config: &TrendDetectorConfig, store: &dyn Store, now: Duration) -> Self {
        Self {
            readings: VecDeque::with_capacity(config.window_readings + 1),
            since_evaluation: 0,
            hysteresis: Hysteresis::new(config.required_windows),
            baseline: DetectorBaseline::load(
                store,
                keys::TREND_DETECTOR_BASELINE,
                config.ema_alpha,
                Duration::from_secs(config.persist_interval_secs),
                now,
            ),
            config: config.clone(),
            last_delta: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.hysteresis.state()
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline.value()
    }

    pub fn last_delta(&self) -> Option<f64> {
        self.last_delta
    }

    pub fn buffered(&self) -> usize {
        self.readings.len()
    }

    /// Spacing between readings fed to `observe`.
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.config.read_interval_ms)
    }

    /// Feed one plausible temperature reading.
    pub fn observe(&mut self, reading: f64, store: &dyn Store, now: Duration) -> Option<Transition> {
        self.readings.push_back(reading);
        while self.readings.len() > self.config.window_readings {
            self.readings.pop_front();
        }
        if self.readings.len() < self.config.window_readings {
            return None;
        }

        self.since_evaluation += 1;
        if self.since_evaluation < self.config.evaluate_every {
            return None;
        }
        self.since_evaluation = 0;

        let window: Vec<f64> = self.readings.iter().copied().collect();
        let slope = match temperature_slope(&window, defaults::SLOPE_ENDPOINT_SAMPLES) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Trend window slope unavailable");
                return None;
            }
        };

        if self.baseline.calibrate_if_missing(slope, store, now) {
            return None;
        }
        let baseline = self.baseline.value()?;
        let delta = slope - baseline;
        self.last_delta = Some(delta);

        let vote = if delta > self.config.deadband {
            Vote::On
        } else if delta < -self.config.deadband {
            Vote::Off
        } else {
            Vote::Neutral
        };

        if self.state() == DetectionState::Off && vote != Vote::On {
            self.baseline.update(slope);
        }

        let (on_count, off_count) = self.hysteresis.counters();
        tracing::debug!(slope, baseline, delta, ?vote, on_count, off_count, "Trend evaluation");

        let transition = self.hysteresis.vote(vote);
        if let Some(t) = transition {
            tracing::info!(?t, slope, delta, "Temperature trend detector transition");
            self.readings.clear();
            self.since_evaluation = 0;
            self.baseline.persist(store, now);
        } else {
            self.baseline.persist_if_due(store, now);
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn config() -> TrendDetectorConfig {
        TrendDetectorConfig {
            deadband: 0.01,
            ..TrendDetectorConfig::default()
        }
    }

    /// Feed readings with a constant per-reading step; returns the first
    /// transition and how many readings it took.
    fn feed(d: &mut TrendDetector, store: &MemoryStore, start: f64, step: f64, n: usize) -> Option<(Transition, usize)> {
        for i in 0..n {
            if let Some(t) = d.observe(start + step * i as f64, store, Duration::ZERO) {
                return Some((t, i + 1));
            }
        }
        None
    }

    #[test]
    fn test_no_evaluation_until_window_full() {
        let store = MemoryStore::new();
        let mut d = TrendDetector::new(&config(), &store, Duration::ZERO);
        assert_eq!(feed(&mut d, &store, 70.0, 0.0, 29), None);
        assert!(!d.baseline.is_calibrated());
        assert_eq!(d.buffered(), 29);
    }

    #[test]
    fn test_flat_idle_then_rise_turns_on() {
        let store = MemoryStore::new();
        let mut d = TrendDetector::new(&config(), &store, Duration::ZERO);

        // window fills at 30, first evaluation at reading 35 calibrates
        assert_eq!(feed(&mut d, &store, 70.0, 0.0, 60), None);
        assert_eq!(d.baseline(), Some(0.0));

        // rising: 4 agreeing evaluations, 6 readings apart
        let (t, n) = feed(&mut d, &store, 70.0, 0.5, 100).expect("transition");
        assert_eq!(t, Transition::TurnedOn);
        assert_eq!(n, 23);
        assert_eq!(d.state(), DetectionState::On);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn test_fall_turns_off_after_on() {
        let store = MemoryStore::new();
        let mut d = TrendDetector::new(&config(), &store, Duration::ZERO);
        feed(&mut d, &store, 70.0, 0.0, 60);
        feed(&mut d, &store, 70.0, 0.5, 100);
        assert_eq!(d.state(), DetectionState::On);

        // plateau inside the deadband never turns off
        assert_eq!(feed(&mut d, &store, 120.0, 0.0, 120), None);
        assert_eq!(d.state(), DetectionState::On);

        let (t, _) = feed(&mut d, &store, 120.0, -0.5, 200).expect("transition");
        assert_eq!(t, Transition::TurnedOff);
    }

    #[test]
    fn test_neutral_window_resets_progress() {
        let store = MemoryStore::new();
        let mut d = TrendDetector::new(&config(), &store, Duration::ZERO);
        feed(&mut d, &store, 70.0, 0.0, 60);

        feed(&mut d, &store, 70.0, 0.5, 11);
        assert_eq!(d.hysteresis.counters().0, 2);

        // back to the starting level: the next window's ends match
        feed(&mut d, &store, 70.0, 0.0, 6);
        assert_eq!(d.hysteresis.counters(), (0, 0));
        assert_eq!(d.state(), DetectionState::Off);
    }

    #[test]
    fn test_idle_slopes_update_baseline() {
        let store = MemoryStore::new();
        let mut d = TrendDetector::new(&config(), &store, Duration::ZERO);
        feed(&mut d, &store, 70.0, 0.0, 35);
        assert_eq!(d.baseline(), Some(0.0));

        // gentle fall votes OFF while OFF: counts as idle evidence
        feed(&mut d, &store, 70.0, -0.1, 30);
        assert!(d.baseline().unwrap_or_default() < 0.0);
    }
}
