//! Vibration-energy detector.

use std::time::Duration;

use super::{DetectionState, DetectorBaseline, Hysteresis, Transition, Vote};
use crate::config::EnergyDetectorConfig;
use crate::storage::{keys, Store};

/// Standard deviation of a window about its own mean (AC energy of the
/// piezo signal). Variance is clamped at zero; an empty window is 0.
pub fn window_rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    var.max(0.0).sqrt()
}

/// Decides ON/OFF from piezo window RMS.
///
/// While OFF a window at or above `baseline × on_multiplier` votes ON; while
/// ON a window at or below `baseline × off_multiplier` votes OFF. The gap
/// between the two multipliers is the hysteresis band.
pub struct EnergyDetector {
    config: EnergyDetectorConfig,
    hysteresis: Hysteresis,
    baseline: DetectorBaseline,
    last_rms: Option<f64>,
}

impl EnergyDetector {
    pub fn new(config: &EnergyDetectorConfig, store: &dyn Store, now: Duration) -> Self {
        Self {
            hysteresis: Hysteresis::new(config.required_windows),
            baseline: DetectorBaseline::load(
                store,
                keys::ENERGY_DETECTOR_BASELINE,
                config.ema_alpha,
                Duration::from_secs(config.persist_interval_secs),
                now,
            ),
            config: config.clone(),
            last_rms: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.hysteresis.state()
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline.value()
    }

    pub fn last_rms(&self) -> Option<f64> {
        self.last_rms
    }

    /// Piezo readings per observation.
    pub fn window_samples(&self) -> usize {
        self.config.window_samples
    }

    /// Time one window takes to capture.
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.config.sample_interval_ms)
            .saturating_mul(u32::try_from(self.config.window_samples).unwrap_or(u32::MAX))
    }

    /// ON and OFF thresholds for the current baseline.
    pub fn thresholds(&self) -> Option<(f64, f64)> {
        self.baseline
            .value()
            .map(|b| (b * self.config.on_multiplier, b * self.config.off_multiplier))
    }

    /// Evaluate one captured window.
    pub fn observe(&mut self, window: &[f64], store: &dyn Store, now: Duration) -> Option<Transition> {
        let rms = window_rms(window);
        self.last_rms = Some(rms);

        if self.baseline.calibrate_if_missing(rms, store, now) {
            return None;
        }
        let (on_threshold, off_threshold) = self.thresholds()?;

        let vote = match self.state() {
            DetectionState::Off if rms >= on_threshold => Vote::On,
            DetectionState::Off => Vote::Off,
            DetectionState::On if rms <= off_threshold => Vote::Off,
            DetectionState::On => Vote::On,
        };

        // Idle windows refine the baseline; a window already voting ON is
        // not idle evidence.
        if self.state() == DetectionState::Off && vote != Vote::On {
            self.baseline.update(rms);
        }

        tracing::debug!(
            rms,
            baseline = self.baseline.value(),
            on_threshold,
            off_threshold,
            state = %self.state(),
            "Energy window"
        );

        let transition = self.hysteresis.vote(vote);
        if let Some(t) = transition {
            tracing::info!(?t, rms, "Vibration energy detector transition");
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
    use crate::storage::{self, MemoryStore};

    /// Window with mean 512 and RMS `amplitude`.
    fn square(amplitude: f64) -> Vec<f64> {
        (0..100)
            .map(|i| if i % 2 == 0 { 512.0 + amplitude } else { 512.0 - amplitude })
            .collect()
    }

    fn detector(store: &MemoryStore) -> EnergyDetector {
        EnergyDetector::new(&EnergyDetectorConfig::default(), store, Duration::ZERO)
    }

    #[test]
    fn test_window_rms() {
        assert!((window_rms(&square(3.0)) - 3.0).abs() < 1e-12);
        assert!(window_rms(&[7.0; 10]).abs() < 1e-12);
        assert!(window_rms(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_first_window_calibrates_without_deciding() {
        let store = MemoryStore::new();
        let mut d = detector(&store);
        assert_eq!(d.observe(&square(100.0), &store, Duration::ZERO), None);
        assert_eq!(d.baseline(), Some(100.0));
        assert_eq!(
            storage::load_json::<f64>(&store, keys::ENERGY_DETECTOR_BASELINE).expect("load"),
            Some(100.0)
        );
    }

    #[test]
    fn test_turns_on_after_three_loud_windows() {
        let store = MemoryStore::new();
        let mut d = detector(&store);
        d.observe(&square(10.0), &store, Duration::ZERO);

        assert_eq!(d.observe(&square(25.0), &store, Duration::ZERO), None);
        assert_eq!(d.observe(&square(25.0), &store, Duration::ZERO), None);
        assert_eq!(
            d.observe(&square(25.0), &store, Duration::ZERO),
            Some(Transition::TurnedOn)
        );
        // loud windows did not raise the idle baseline
        assert_eq!(d.baseline(), Some(10.0));
    }

    #[test]
    fn test_hysteresis_band_holds_on_state() {
        let store = MemoryStore::new();
        let mut d = detector(&store);
        d.observe(&square(10.0), &store, Duration::ZERO);
        for _ in 0..3 {
            d.observe(&square(25.0), &store, Duration::ZERO);
        }
        assert_eq!(d.state(), DetectionState::On);

        // 17 sits between OFF (15) and ON (20): stays ON indefinitely
        for _ in 0..10 {
            assert_eq!(d.observe(&square(17.0), &store, Duration::ZERO), None);
        }
        assert_eq!(d.state(), DetectionState::On);

        for _ in 0..2 {
            assert_eq!(d.observe(&square(14.0), &store, Duration::ZERO), None);
        }
        assert_eq!(
            d.observe(&square(14.0), &store, Duration::ZERO),
            Some(Transition::TurnedOff)
        );
    }

    #[test]
    fn test_baseline_frozen_while_on() {
        let store = MemoryStore::new();
        let mut d = detector(&store);
        d.observe(&square(10.0), &store, Duration::ZERO);
        for _ in 0..3 {
            d.observe(&square(40.0), &store, Duration::ZERO);
        }
        let before = d.baseline();
        for _ in 0..20 {
            d.observe(&square(40.0), &store, Duration::ZERO);
        }
        assert_eq!(d.baseline(), before);
    }

    #[test]
    fn test_quiet_windows_track_baseline() {
        let store = MemoryStore::new();
        let mut d = detector(&store);
        d.observe(&square(10.0), &store, Duration::ZERO);
        d.observe(&square(12.0), &store, Duration::ZERO);
        assert!((d.baseline().unwrap_or_default() - 10.02).abs() < 1e-9);
    }

    #[test]
    fn test_window_duration() {
        let store = MemoryStore::new();
        let d = detector(&store);
        assert_eq!(d.window_duration(), Duration::from_millis(500));
    }
}
