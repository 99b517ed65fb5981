//! Vibration window accumulation and dominant-frequency extraction.

use num_complex::Complex;

use super::{fft_in_place, magnitude, ProcessingError};
use crate::config::{defaults, SpectralConfig};

/// Magnitude spectrum, one entry per FFT bin.
pub type SpectrumVector = Vec<f64>;

/// Collects raw piezo samples into a fixed-length window and turns full
/// windows into magnitude spectra.
///
/// The window buffer is allocated once and reused; `transform` and `clear`
/// empty it without releasing capacity.
pub struct SpectralExtractor {
    window: Vec<Complex<f64>>,
    length: usize,
    sample_rate_hz: f64,
    frequency_offset_hz: f64,
}

impl SpectralExtractor {
    /// Extractor for the standard 2048-sample window.
    pub fn new(config: &SpectralConfig) -> Self {
        Self::with_length(defaults::FFT_LENGTH, config)
    }

    pub fn with_length(length: usize, config: &SpectralConfig) -> Self {
        Self {
            window: Vec::with_capacity(length),
            length,
            sample_rate_hz: config.sample_rate_hz,
            frequency_offset_hz: config.frequency_offset_hz,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() >= self.length
    }

    pub fn window_length(&self) -> usize {
        self.length
    }

    /// Append one raw sample. Returns true once the window is full; a full
    /// window ignores further samples until it is transformed or cleared.
    pub fn accumulate(&mut self, sample: f64) -> bool {
        if self.is_full() {
            return true;
        }
        self.window.push(Complex::new(sample, 0.0));
        self.is_full()
    }

    /// FFT the full window and return its magnitudes, emptying the window.
    pub fn transform(&mut self) -> Result<SpectrumVector, ProcessingError> {
        if !self.is_full() {
            return Err(ProcessingError::InsufficientData {
                needed: self.length,
                available: self.window.len(),
            });
        }
        let result = fft_in_place(&mut self.window).map(|()| magnitude(&self.window));
        self.window.clear();
        result
    }

    /// Drop a partially collected window.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Bin → hertz using the configured capture rate and calibration offset.
    pub fn frequency_of(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate_hz / self.length as f64 + self.frequency_offset_hz
    }
}

/// Index of the strongest bin in `[LOW_FREQUENCY_BINS, len / 2)`.
///
/// Ties resolve to the lowest index. `None` if the search range is empty.
pub fn dominant_bin(spectrum: &[f64]) -> Option<usize> {
    let upper = spectrum.len() / 2;
    let lower = defaults::LOW_FREQUENCY_BINS;
    if lower >= upper {
        return None;
    }
    let mut best = lower;
    for i in lower + 1..upper {
        if spectrum[i] > spectrum[best] {
            best = i;
        }
    }
    Some(best)
}
