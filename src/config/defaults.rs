//! System-wide default constants.
//!
//! Fixed parameters of the signal chain that are not operator-tunable,
//! plus the defaults the TOML sections fall back to. Grouped by subsystem.

// ============================================================================
// Spectral Extraction
// ============================================================================

/// Vibration window length fed to the FFT. Must be a power of two.
pub const FFT_LENGTH: usize = 2048;

/// Low-frequency bins excluded from the dominant-bin search (DC and drift).
pub const LOW_FREQUENCY_BINS: usize = 20;

/// Effective piezo sampling rate used to convert bins to hertz.
pub const SAMPLE_RATE_HZ: f64 = 200.0;

/// Calibration offset added to every bin frequency (Hz).
pub const FREQUENCY_OFFSET_HZ: f64 = 56.0;

// ============================================================================
// Baseline Statistics
// ============================================================================

/// Readings averaged at each end of a temperature series for the slope.
pub const SLOPE_ENDPOINT_SAMPLES: usize = 5;

/// Stored spectra required before the spectral baseline is built.
///
/// Also the number of spectra the vibration standard deviation spans.
pub const MIN_SPECTRAL_POPULATION: usize = 100;

/// Slope history entries required before a temperature z-score is produced.
pub const MIN_SLOPE_POPULATION: usize = 100;

/// Maximum retained slope history entries.
pub const SLOPE_HISTORY_CAP: usize = 800;

// ============================================================================
// Sampler
// ============================================================================

/// Lowest plausible surface temperature (°F).
pub const TEMPERATURE_MIN_F: f64 = 30.0;

/// Highest plausible surface temperature (°F).
pub const TEMPERATURE_MAX_F: f64 = 175.0;

/// Re-sample attempts before a temperature tick is abandoned.
pub const SAMPLER_MAX_ATTEMPTS: u32 = 50;

// ============================================================================
// Cycle Controller
// ============================================================================

/// Temperature samples per cycle (one every 5 s for 10 minutes).
pub const TEMPERATURE_SAMPLES_PER_CYCLE: usize = 120;

/// Spacing between temperature samples while collecting (ms).
pub const TEMPERATURE_INTERVAL_MS: u64 = 5_000;

/// Tick period while collecting vibration (ms).
pub const COLLECT_TICK_MS: u64 = 5;

// ============================================================================
// Notifier
// ============================================================================

/// Bounded capacity of the control-loop → worker queue (units).
pub const NOTIFY_QUEUE_CAPACITY: usize = 32;

/// HTTP timeout for chat API requests (seconds).
pub const NOTIFIER_HTTP_TIMEOUT_SECS: u64 = 15;
