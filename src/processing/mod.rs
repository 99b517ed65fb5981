//! Signal processing - vibration spectrum extraction

mod fft;
mod spectral;

pub use fft::{fft_in_place, magnitude};
pub use spectral::{dominant_bin, SpectralExtractor, SpectrumVector};

use thiserror::Error;

/// Errors in signal processing
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("FFT length {0} is not a power of two")]
    NotPowerOfTwo(usize),
}
