//! Plausibility-gated reads on top of a `SensorSource`.

use super::{AcquisitionError, SensorSource};
use crate::config::SamplerConfig;
use crate::types::Channel;

/// Wraps a sensor source with range validation and in-place retries.
///
/// Implausible temperatures (probe glitches, disconnected sensor) are
/// discarded and re-sampled immediately. A tick that never gets a plausible
/// value returns `OutOfRange` and the caller simply tries again next tick.
pub struct Sampler {
    source: Box<dyn SensorSource>,
    min_f: f64,
    max_f: f64,
    max_attempts: u32,
    rejected: u64,
}

impl Sampler {
    pub fn new(source: Box<dyn SensorSource>, config: &SamplerConfig) -> Self {
        Self {
            source,
            min_f: config.temperature_min_f,
            max_f: config.temperature_max_f,
            max_attempts: config.max_attempts.max(1),
            rejected: 0,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Total readings discarded by the plausibility gate or read failures.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Read a temperature inside `[min, max]`, re-sampling on failure.
    pub fn read_temperature(&mut self) -> Result<f64, AcquisitionError> {
        let mut last = f64::NAN;
        for attempt in 1..=self.max_attempts {
            match self.source.read(Channel::Temperature) {
                Ok(value) if (self.min_f..=self.max_f).contains(&value) => return Ok(value),
                Ok(value) => {
                    tracing::debug!(value, attempt, "Discarding implausible temperature");
                    last = value;
                    self.rejected += 1;
                }
                Err(e @ AcquisitionError::Exhausted(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Temperature read failed, retrying");
                    self.rejected += 1;
                }
            }
        }
        Err(AcquisitionError::OutOfRange {
            last,
            attempts: self.max_attempts,
        })
    }

    /// Read one raw piezo value, retrying transient failures in place.
    pub fn read_vibration(&mut self) -> Result<f64, AcquisitionError> {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.source.read(Channel::Vibration) {
                Ok(value) if value.is_finite() => return Ok(value),
                Ok(value) => {
                    self.rejected += 1;
                    last_err = Some(AcquisitionError::Read {
                        channel: Channel::Vibration,
                        reason: format!("non-finite value {value}"),
                    });
                }
                Err(e @ AcquisitionError::Exhausted(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Vibration read failed, retrying");
                    self.rejected += 1;
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(AcquisitionError::Read {
            channel: Channel::Vibration,
            reason: "no attempts made".to_string(),
        }))
    }

    /// Read `n` consecutive piezo values.
    pub fn read_vibration_window(&mut self, n: usize) -> Result<Vec<f64>, AcquisitionError> {
        (0..n).map(|_| self.read_vibration()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ReplaySource;

    fn sampler(temps: Vec<f64>, vibs: Vec<f64>, max_attempts: u32) -> Sampler {
        let config = SamplerConfig {
            max_attempts,
            ..SamplerConfig::default()
        };
        Sampler::new(Box::new(ReplaySource::scripted(temps, vibs)), &config)
    }

    #[test]
    fn test_implausible_readings_are_resampled() {
        let mut s = sampler(vec![-127.0, 200.0, 72.5], vec![], 5);
        assert!((s.read_temperature().expect("plausible") - 72.5).abs() < f64::EPSILON);
        assert_eq!(s.rejected(), 2);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut s = sampler(vec![30.0, 175.0], vec![], 1);
        assert!(s.read_temperature().is_ok());
        assert!(s.read_temperature().is_ok());
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut s = sampler(vec![-127.0; 3], vec![], 3);
        match s.read_temperature() {
            Err(AcquisitionError::OutOfRange { last, attempts }) => {
                assert!((last + 127.0).abs() < f64::EPSILON);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_source_is_not_retried() {
        let mut s = sampler(vec![], vec![1.0, 2.0], 10);
        assert!(matches!(
            s.read_temperature(),
            Err(AcquisitionError::Exhausted(Channel::Temperature))
        ));
        assert_eq!(s.read_vibration_window(2).expect("window"), vec![1.0, 2.0]);
        assert!(matches!(
            s.read_vibration(),
            Err(AcquisitionError::Exhausted(Channel::Vibration))
        ));
    }
}
