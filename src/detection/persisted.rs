//! Learned idle level shared by both detectors.

use std::time::Duration;

use crate::storage::{self, Store};

/// Scalar baseline learned by EMA and persisted across restarts.
///
/// With no stored value the first measurement becomes the baseline
/// (calibration) and is written immediately. After that the value is
/// written at most once per `persist_interval`, plus whenever the owning
/// detector forces a write on a transition.
#[derive(Debug, Clone)]
pub struct DetectorBaseline {
    key: &'static str,
    value: Option<f64>,
    alpha: f64,
    persist_interval: Duration,
    last_persist: Duration,
}

impl DetectorBaseline {
    /// Load the baseline stored under `key`. Store errors are logged and
    /// treated as "not calibrated".
    pub fn load(
        store: &dyn Store,
        key: &'static str,
        alpha: f64,
        persist_interval: Duration,
        now: Duration,
    ) -> Self {
        let value = match storage::load_json::<f64>(store, key) {
            Ok(Some(v)) if v.is_finite() => {
                tracing::info!(key, baseline = v, "Loaded detector baseline");
                Some(v)
            }
            Ok(Some(v)) => {
                tracing::warn!(key, baseline = v, "Stored detector baseline is not finite, recalibrating");
                None
            }
            Ok(None) => {
                tracing::info!(key, "Detector baseline not present, will calibrate from first measurement");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to load detector baseline, will calibrate");
                None
            }
        };
        Self {
            key,
            value,
            alpha,
            persist_interval,
            last_persist: now,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_calibrated(&self) -> bool {
        self.value.is_some()
    }

    /// Seed from `measurement` if uncalibrated. Returns true when this call
    /// performed the calibration; the caller skips its decision for it.
    pub fn calibrate_if_missing(&mut self, measurement: f64, store: &dyn Store, now: Duration) -> bool {
        if self.value.is_some() || !measurement.is_finite() {
            return false;
        }
        self.value = Some(measurement);
        tracing::info!(key = self.key, baseline = measurement, "Calibrated idle baseline");
        self.persist(store, now);
        true
    }

    /// `b = (1 - α)·b + α·x`. Only called while the detector believes OFF.
    pub fn update(&mut self, measurement: f64) {
        if !measurement.is_finite() {
            return;
        }
        if let Some(b) = self.value.as_mut() {
            *b = (1.0 - self.alpha) * *b + self.alpha * measurement;
        }
    }

    /// Persist if the interval has elapsed since the last write.
    pub fn persist_if_due(&mut self, store: &dyn Store, now: Duration) {
        if now.saturating_sub(self.last_persist) >= self.persist_interval {
            self.persist(store, now);
        }
    }

    pub fn persist(&mut self, store: &dyn Store, now: Duration) {
        let Some(value) = self.value else {
            return;
        };
        self.last_persist = now;
        match storage::save_json(store, self.key, &value) {
            Ok(()) => tracing::debug!(key = self.key, baseline = value, "Baseline persisted"),
            Err(e) => tracing::warn!(key = self.key, error = %e, "Failed to persist baseline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const KEY: &str = "detector/test";

    fn fresh(store: &MemoryStore) -> DetectorBaseline {
        DetectorBaseline::load(store, KEY, 0.01, Duration::from_secs(60), Duration::ZERO)
    }

    #[test]
    fn test_calibrates_once_and_persists_immediately() {
        let store = MemoryStore::new();
        let mut b = fresh(&store);
        assert!(!b.is_calibrated());

        assert!(b.calibrate_if_missing(12.0, &store, Duration::ZERO));
        assert!(!b.calibrate_if_missing(99.0, &store, Duration::ZERO));
        assert_eq!(b.value(), Some(12.0));
        assert_eq!(storage::load_json::<f64>(&store, KEY).expect("load"), Some(12.0));
    }

    #[test]
    fn test_ema_fixed_point() {
        let store = MemoryStore::new();
        let mut b = fresh(&store);
        b.calibrate_if_missing(5.0, &store, Duration::ZERO);
        for _ in 0..1_000 {
            b.update(5.0);
        }
        assert!((b.value().unwrap_or_default() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_moves_toward_measurement() {
        let store = MemoryStore::new();
        let mut b = fresh(&store);
        b.calibrate_if_missing(10.0, &store, Duration::ZERO);
        b.update(20.0);
        assert!((b.value().unwrap_or_default() - 10.1).abs() < 1e-12);
    }

    #[test]
    fn test_persist_respects_interval() {
        let store = MemoryStore::new();
        let mut b = fresh(&store);
        b.calibrate_if_missing(10.0, &store, Duration::ZERO);
        b.update(20.0);

        b.persist_if_due(&store, Duration::from_secs(30));
        assert_eq!(storage::load_json::<f64>(&store, KEY).expect("load"), Some(10.0));

        b.persist_if_due(&store, Duration::from_secs(60));
        let stored = storage::load_json::<f64>(&store, KEY).expect("load").unwrap_or_default();
        assert!((stored - 10.1).abs() < 1e-12);
    }

    #[test]
    fn test_reload_uses_stored_value() {
        let store = MemoryStore::new();
        storage::save_json(&store, KEY, &42.0).expect("save");
        let b = fresh(&store);
        assert_eq!(b.value(), Some(42.0));
    }

    #[test]
    fn test_store_failure_does_not_lose_in_memory_value() {
        let store = MemoryStore::new();
        store.set_read_only(true);
        let mut b = fresh(&store);
        assert!(b.calibrate_if_missing(3.0, &store, Duration::ZERO));
        assert_eq!(b.value(), Some(3.0));
    }
}
