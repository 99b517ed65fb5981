//! Baseline statistics - reference populations and anomaly scores
//!
//! Turns raw per-cycle measurements into alert-worthy numbers:
//!
//! - **Temperature**: each completed cycle contributes one slope to a bounded
//!   history; a new slope is scored as a z-score against that history.
//! - **Vibration**: every transformed window is stored; the element-wise mean
//!   of the first 100 becomes the spectral baseline, and each later window is
//!   scored as its Euclidean distance from the baseline in units of the
//!   population's typical distance.
//!
//! Populations below their minimum size yield `InsufficientData`; callers
//! skip the dependent score rather than fail.

use statrs::statistics::Statistics;
use thiserror::Error;

use crate::config::StatisticsConfig;
use crate::processing::SpectrumVector;
use crate::storage::{self, keys, Store, StoreError};

#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Reference population has zero or non-finite spread")]
    ZeroVariance,
}

// ============================================================================
// Pure Functions
// ============================================================================

/// `|sample − mean| / σ` with the population standard deviation.
pub fn z_score(sample: f64, population: &[f64], min_population: usize) -> Result<f64, StatsError> {
    let needed = min_population.max(2);
    if population.len() < needed {
        return Err(StatsError::InsufficientData {
            needed,
            available: population.len(),
        });
    }
    let mean = population.iter().mean();
    let std_dev = population.iter().population_std_dev();
    if !std_dev.is_finite() || std_dev <= 0.0 {
        return Err(StatsError::ZeroVariance);
    }
    Ok((sample - mean).abs() / std_dev)
}

/// Sum of squared element differences. Mismatched lengths are logged and
/// score `0.0`.
pub fn spectral_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        tracing::warn!(left = a.len(), right = b.len(), "Cannot compare spectra of different sizes");
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    spectral_distance(a, b).sqrt()
}

/// Warm-up slope of a temperature series: mean of the last `endpoint`
/// readings minus mean of the first `endpoint`, over the span between them.
pub fn temperature_slope(readings: &[f64], endpoint: usize) -> Result<f64, StatsError> {
    let endpoint = endpoint.max(1);
    let needed = 2 * endpoint;
    if readings.len() < needed {
        return Err(StatsError::InsufficientData {
            needed,
            available: readings.len(),
        });
    }
    let first = readings[..endpoint].iter().mean();
    let last = readings[readings.len() - endpoint..].iter().mean();
    Ok((last - first) / (readings.len() - endpoint) as f64)
}

/// Element-wise mean of the first `population` stored spectra.
///
/// `None` when any of them is missing, unreadable, or a different length
/// from the first.
pub fn build_spectral_baseline(store: &dyn Store, population: usize) -> Option<SpectrumVector> {
    let mut sum: Option<Vec<f64>> = None;
    for i in 0..population {
        let spectrum: SpectrumVector = match storage::load_json(store, &keys::spectrum(i as u64)) {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::warn!(index = i, "Spectrum missing, cannot build baseline");
                return None;
            }
            Err(e) => {
                tracing::warn!(index = i, error = %e, "Spectrum unreadable, cannot build baseline");
                return None;
            }
        };
        match sum.as_mut() {
            None => sum = Some(spectrum),
            Some(acc) if acc.len() == spectrum.len() => {
                acc.iter_mut().zip(&spectrum).for_each(|(a, x)| *a += x);
            }
            Some(acc) => {
                tracing::warn!(index = i, expected = acc.len(), got = spectrum.len(), "Spectrum length mismatch, cannot build baseline");
                return None;
            }
        }
    }
    let n = population as f64;
    sum.map(|acc| acc.into_iter().map(|x| x / n).collect())
}

// ============================================================================
// Running State
// ============================================================================

/// Reference populations and per-cycle accumulators, restored from the
/// store at startup.
pub struct BaselineStatistics {
    config: StatisticsConfig,
    slope_history: Vec<f64>,
    spectral_baseline: Option<SpectrumVector>,
    vibration_std: Option<f64>,
    spectra_stored: u64,
    score_sum: f64,
    score_count: u32,
}

impl BaselineStatistics {
    pub fn load(store: &dyn Store, config: &StatisticsConfig) -> Self {
        let slope_history: Vec<f64> = storage::load_json(store, keys::TEMPERATURE_BASELINE)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Slope history unreadable, starting empty");
                None
            })
            .unwrap_or_default();
        let spectral_baseline: Option<SpectrumVector> =
            storage::load_json(store, keys::VIBRATION_BASELINE).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Spectral baseline unreadable, will rebuild");
                None
            });
        let spectra_stored = store.count(keys::SPECTRUM_PREFIX).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to count stored spectra");
            0
        }) as u64;

        tracing::info!(
            slopes = slope_history.len(),
            spectra = spectra_stored,
            spectral_baseline = spectral_baseline.is_some(),
            "Baseline statistics restored"
        );

        Self {
            config: config.clone(),
            slope_history,
            spectral_baseline,
            vibration_std: None,
            spectra_stored,
            score_sum: 0.0,
            score_count: 0,
        }
    }

    pub fn slope_history(&self) -> &[f64] {
        &self.slope_history
    }

    pub fn spectra_stored(&self) -> u64 {
        self.spectra_stored
    }

    pub fn has_spectral_baseline(&self) -> bool {
        self.spectral_baseline.is_some()
    }

    /// Z-score of `slope` against the history as it stands (call before
    /// `record_slope` for the same cycle).
    pub fn temperature_z(&self, slope: f64) -> Result<f64, StatsError> {
        z_score(slope, &self.slope_history, self.config.min_slope_population)
    }

    /// Append a cycle slope while below the cap and persist the history.
    /// At the cap the history is persisted unchanged. Returns whether the
    /// slope was appended.
    pub fn record_slope(&mut self, slope: f64, store: &dyn Store) -> bool {
        let appended = self.slope_history.len() < self.config.slope_history_cap;
        if appended {
            self.slope_history.push(slope);
        }
        if let Err(e) = storage::save_json(store, keys::TEMPERATURE_BASELINE, &self.slope_history) {
            tracing::warn!(error = %e, "Failed to persist slope history");
        }
        appended
    }

    /// Persist a raw spectrum as the next member of the population.
    pub fn record_spectrum(&mut self, spectrum: &[f64], store: &dyn Store) -> Result<u64, StoreError> {
        let index = self.spectra_stored;
        storage::save_json(store, &keys::spectrum(index), spectrum)?;
        self.spectra_stored += 1;
        Ok(index)
    }

    /// Build and persist the spectral baseline once enough spectra exist.
    /// Returns true when a baseline was built by this call.
    pub fn ensure_spectral_baseline(&mut self, store: &dyn Store) -> bool {
        let population = self.config.min_spectral_population;
        if self.spectral_baseline.is_some() || self.spectra_stored < population as u64 {
            return false;
        }
        let Some(baseline) = build_spectral_baseline(store, population) else {
            return false;
        };
        if let Err(e) = storage::save_json(store, keys::VIBRATION_BASELINE, &baseline) {
            tracing::warn!(error = %e, "Failed to persist spectral baseline");
        }
        tracing::info!(population, bins = baseline.len(), "📊 Spectral baseline built");
        self.spectral_baseline = Some(baseline);
        true
    }

    /// Typical Euclidean distance of the reference population from the
    /// baseline. Computed on first use, then cached.
    pub fn vibration_std(&mut self, store: &dyn Store) -> Option<f64> {
        if self.vibration_std.is_some() {
            return self.vibration_std;
        }
        let baseline = self.spectral_baseline.as_ref()?;

        let mut total = 0.0;
        let mut valid = 0usize;
        for i in 0..self.config.min_spectral_population {
            match storage::load_json::<SpectrumVector>(store, &keys::spectrum(i as u64)) {
                Ok(Some(s)) if s.len() == baseline.len() => {
                    total += spectral_distance(baseline, &s);
                    valid += 1;
                }
                Ok(Some(s)) => {
                    tracing::warn!(index = i, len = s.len(), "Skipping spectrum of wrong length");
                }
                Ok(None) => tracing::warn!(index = i, "Reference spectrum missing"),
                Err(e) => tracing::warn!(index = i, error = %e, "Reference spectrum unreadable"),
            }
        }
        if valid == 0 {
            return None;
        }
        let std = (total / valid as f64).sqrt();
        if !std.is_finite() || std <= 0.0 {
            tracing::warn!(std, "Vibration reference spread is zero, windows cannot be scored");
            return None;
        }
        tracing::info!(std, population = valid, "Vibration reference spread computed");
        self.vibration_std = Some(std);
        self.vibration_std
    }

    /// Score a window against the spectral baseline and add it to the
    /// running cycle total. `None` while no baseline/spread is available.
    pub fn score_window(&mut self, spectrum: &[f64], store: &dyn Store) -> Option<f64> {
        let std = self.vibration_std(store)?;
        let baseline = self.spectral_baseline.as_ref()?;
        let score = euclidean_distance(baseline, spectrum) / std;
        self.score_sum += score;
        self.score_count += 1;
        Some(score)
    }

    /// Windows scored so far in the current cycle.
    pub fn windows_scored(&self) -> u32 {
        self.score_count
    }

    /// Average window score of the cycle; resets the accumulator.
    pub fn finish_cycle_vibration(&mut self) -> Option<f64> {
        let result = (self.score_count > 0).then(|| self.score_sum / f64::from(self.score_count));
        self.score_sum = 0.0;
        self.score_count = 0;
        result
    }
}
