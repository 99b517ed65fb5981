//! Store key layout.

/// Temperature slope history (`Vec<f64>`, bounded).
pub const TEMPERATURE_BASELINE: &str = "temperature/baseline";

/// Spectral baseline vector.
pub const VIBRATION_BASELINE: &str = "vibration/baseline";

/// Prefix of the raw spectrum population.
pub const SPECTRUM_PREFIX: &str = "vibration/data/";

/// Prefix of per-cycle raw temperature series.
pub const TEMPERATURE_SERIES_PREFIX: &str = "temperature/data/";

pub const ENERGY_DETECTOR_BASELINE: &str = "detector/energy_baseline";
pub const TREND_DETECTOR_BASELINE: &str = "detector/trend_baseline";

/// Completed cycle counter.
pub const CYCLE_COUNTER: &str = "cycle/counter";

/// NDJSON journal of `CycleRecord`s.
pub const CYCLE_JOURNAL: &str = "cycle/journal";

/// Ids of the three long-lived chat messages.
pub const MESSAGE_IDS: &str = "notifier/message_ids";

/// Key of the `index`-th stored spectrum.
pub fn spectrum(index: u64) -> String {
    format!("{SPECTRUM_PREFIX}{index}")
}

/// Key of the raw temperature series of cycle `cycle`.
pub fn temperature_series(cycle: u64) -> String {
    format!("{TEMPERATURE_SERIES_PREFIX}{cycle}")
}
