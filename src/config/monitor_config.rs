//! Monitor Configuration - every tunable of the duty-cycle monitor as TOML
//!
//! Each section implements `Default` with the values the firmware shipped
//! with, so a missing or empty config file yields the reference behaviour.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "COMPRESSOR_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "monitor_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one monitored compressor.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$COMPRESSOR_CONFIG` env var
/// 2. `./monitor_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub spectral: SpectralConfig,

    /// Vibration-energy detector (piezo window RMS)
    #[serde(default)]
    pub energy_detector: EnergyDetectorConfig,

    /// Temperature-trend detector
    #[serde(default)]
    pub trend_detector: TrendDetectorConfig,

    #[serde(default)]
    pub statistics: StatisticsConfig,

    #[serde(default)]
    pub cycle: CycleConfig,

    /// Z-score alert bands
    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order, falling back to
    /// defaults when nothing usable is found. Never fails.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), device = %config.device.name, "Loaded monitor config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(device = %config.device.name, "Loaded monitor config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No monitor config found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML (used by `--dump-config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every cross-field constraint, collecting all failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Sampler
        let s = &self.sampler;
        if !s.temperature_min_f.is_finite() || !s.temperature_max_f.is_finite() {
            errors.push("sampler: temperature bounds must be finite".to_string());
        } else if s.temperature_min_f >= s.temperature_max_f {
            errors.push(format!(
                "sampler: temperature_min_f ({}) must be < temperature_max_f ({})",
                s.temperature_min_f, s.temperature_max_f
            ));
        }
        if s.max_attempts == 0 {
            errors.push("sampler.max_attempts must be > 0".to_string());
        }

        // Spectral
        if !(self.spectral.sample_rate_hz.is_finite() && self.spectral.sample_rate_hz > 0.0) {
            errors.push("spectral.sample_rate_hz must be > 0".to_string());
        }
        if !self.spectral.frequency_offset_hz.is_finite() {
            errors.push("spectral.frequency_offset_hz must be finite".to_string());
        }

        // Energy detector: ON must sit above OFF for the hysteresis band to exist
        let e = &self.energy_detector;
        Self::check_alpha(e.ema_alpha, "energy_detector.ema_alpha", &mut errors);
        if !e.on_multiplier.is_finite() || !e.off_multiplier.is_finite() {
            errors.push("energy_detector: multipliers must be finite".to_string());
        } else if e.on_multiplier <= e.off_multiplier {
            errors.push(format!(
                "energy_detector: on_multiplier ({:.3}) must be > off_multiplier ({:.3})",
                e.on_multiplier, e.off_multiplier
            ));
        }
        if e.window_samples < 2 {
            errors.push("energy_detector.window_samples must be >= 2".to_string());
        }
        if e.required_windows == 0 {
            errors.push("energy_detector.required_windows must be > 0".to_string());
        }
        if e.persist_interval_secs == 0 {
            errors.push("energy_detector.persist_interval_secs must be > 0".to_string());
        }

        // Trend detector
        let t = &self.trend_detector;
        Self::check_alpha(t.ema_alpha, "trend_detector.ema_alpha", &mut errors);
        if t.window_readings < 2 * defaults::SLOPE_ENDPOINT_SAMPLES {
            errors.push(format!(
                "trend_detector.window_readings must be >= {}",
                2 * defaults::SLOPE_ENDPOINT_SAMPLES
            ));
        }
        if t.evaluate_every == 0 {
            errors.push("trend_detector.evaluate_every must be > 0".to_string());
        }
        if t.required_windows == 0 {
            errors.push("trend_detector.required_windows must be > 0".to_string());
        }
        if !(t.deadband.is_finite() && t.deadband >= 0.0) {
            errors.push("trend_detector.deadband must be finite and >= 0".to_string());
        }
        if t.read_interval_ms == 0 {
            errors.push("trend_detector.read_interval_ms must be > 0".to_string());
        }
        if t.persist_interval_secs == 0 {
            errors.push("trend_detector.persist_interval_secs must be > 0".to_string());
        }

        // Statistics
        let st = &self.statistics;
        if st.slope_history_cap < st.min_slope_population {
            errors.push(format!(
                "statistics: slope_history_cap ({}) must be >= min_slope_population ({})",
                st.slope_history_cap, st.min_slope_population
            ));
        }
        if st.min_slope_population < 2 {
            errors.push("statistics.min_slope_population must be >= 2".to_string());
        }
        if st.min_spectral_population == 0 {
            errors.push("statistics.min_spectral_population must be > 0".to_string());
        }

        // Cycle
        let c = &self.cycle;
        if c.min_temperature_samples < 2 * defaults::SLOPE_ENDPOINT_SAMPLES {
            errors.push(format!(
                "cycle.min_temperature_samples must be >= {}",
                2 * defaults::SLOPE_ENDPOINT_SAMPLES
            ));
        }
        if c.temperature_interval_ms == 0 || c.collect_tick_ms == 0 {
            errors.push("cycle: temperature_interval_ms and collect_tick_ms must be > 0".to_string());
        }

        // Alerts: critical >= warning
        Self::check_escalation(
            self.alerts.temperature_warning,
            self.alerts.temperature_critical,
            "alerts.temperature",
            &mut errors,
        );
        Self::check_escalation(
            self.alerts.vibration_warning,
            self.alerts.vibration_critical,
            "alerts.vibration",
            &mut errors,
        );

        // Notifier
        if self.notifier.queue_capacity == 0 {
            errors.push("notifier.queue_capacity must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_alpha(alpha: f64, name: &str, errors: &mut Vec<String>) {
        if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
            errors.push(format!("{name}: must be in (0, 1] (got {alpha})"));
        }
    }

    fn check_escalation(warning: f64, critical: f64, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass
        if !warning.is_finite() || !critical.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got warning={warning}, critical={critical})"
            ));
            return;
        }
        if critical < warning {
            errors.push(format!(
                "{name}: critical ({critical:.3}) must be >= warning ({warning:.3})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            Self::Serialize(e) => write!(f, "Config serialization error: {e}"),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Sections
// ============================================================================

/// Identification; shows up in the status message and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Fridge Compressor 1".to_string(),
        }
    }
}

/// Plausibility gate for temperature readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub temperature_min_f: f64,
    pub temperature_max_f: f64,
    /// Re-sample attempts before the tick gives up
    pub max_attempts: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            temperature_min_f: defaults::TEMPERATURE_MIN_F,
            temperature_max_f: defaults::TEMPERATURE_MAX_F,
            max_attempts: defaults::SAMPLER_MAX_ATTEMPTS,
        }
    }
}

/// Bin-to-frequency conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub sample_rate_hz: f64,
    pub frequency_offset_hz: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: defaults::SAMPLE_RATE_HZ,
            frequency_offset_hz: defaults::FREQUENCY_OFFSET_HZ,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyDetectorConfig {
    /// Piezo readings per RMS window
    pub window_samples: usize,
    /// Spacing between piezo readings inside a window (ms)
    pub sample_interval_ms: u64,
    pub ema_alpha: f64,
    pub on_multiplier: f64,
    pub off_multiplier: f64,
    /// Consecutive agreeing windows required for a transition
    pub required_windows: u32,
    pub persist_interval_secs: u64,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            window_samples: 500,
            sample_interval_ms: 1,
            ema_alpha: 0.01,
            on_multiplier: 2.0,
            off_multiplier: 1.5,
            required_windows: 3,
            persist_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendDetectorConfig {
    /// Sliding window of temperature readings
    pub window_readings: usize,
    /// Readings between evaluations once the window is full
    pub evaluate_every: usize,
    /// Spacing between trend readings (ms)
    pub read_interval_ms: u64,
    /// Slope deltas within ±deadband count as no trend
    pub deadband: f64,
    pub ema_alpha: f64,
    pub required_windows: u32,
    pub persist_interval_secs: u64,
}

impl Default for TrendDetectorConfig {
    fn default() -> Self {
        Self {
            window_readings: 30,
            evaluate_every: 6,
            read_interval_ms: 5_000,
            deadband: 0.01,
            ema_alpha: 0.01,
            required_windows: 4,
            persist_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub slope_history_cap: usize,
    pub min_slope_population: usize,
    pub min_spectral_population: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            slope_history_cap: defaults::SLOPE_HISTORY_CAP,
            min_slope_population: defaults::MIN_SLOPE_POPULATION,
            min_spectral_population: defaults::MIN_SPECTRAL_POPULATION,
        }
    }
}

/// How the two detectors combine into a single ON/OFF decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Temperature trend alone decides (reference behaviour)
    #[default]
    Temperature,
    /// Both detectors must report ON
    All,
    /// Either detector reporting ON is enough
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Temperature samples that complete a cycle
    pub min_temperature_samples: usize,
    pub temperature_interval_ms: u64,
    /// Tick period while collecting vibration
    pub collect_tick_ms: u64,
    pub detection_mode: DetectionMode,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            min_temperature_samples: defaults::TEMPERATURE_SAMPLES_PER_CYCLE,
            temperature_interval_ms: defaults::TEMPERATURE_INTERVAL_MS,
            collect_tick_ms: defaults::COLLECT_TICK_MS,
            detection_mode: DetectionMode::default(),
        }
    }
}

/// Z-score bands used by the status assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub temperature_warning: f64,
    pub temperature_critical: f64,
    pub vibration_warning: f64,
    pub vibration_critical: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            temperature_warning: 2.0,
            temperature_critical: 3.0,
            vibration_warning: 2.0,
            vibration_critical: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub queue_capacity: usize,
    pub http_timeout_secs: u64,
    /// Poll the chat inbox for `/status` and `/clear` on `CheckInbox`
    pub poll_inbox: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::NOTIFY_QUEUE_CAPACITY,
            http_timeout_secs: defaults::NOTIFIER_HTTP_TIMEOUT_SECS,
            poll_inbox: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = MonitorConfig::from_toml_str("").expect("empty config");
        assert_eq!(config.device.name, "Fridge Compressor 1");
        assert_eq!(config.energy_detector.required_windows, 3);
        assert_eq!(config.trend_detector.required_windows, 4);
        assert_eq!(config.cycle.detection_mode, DetectionMode::Temperature);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = MonitorConfig::from_toml_str(
            r#"
[energy_detector]
on_multiplier = 3.0

[cycle]
detection_mode = "all"
"#,
        )
        .expect("partial config");
        assert!((config.energy_detector.on_multiplier - 3.0).abs() < f64::EPSILON);
        assert!((config.energy_detector.off_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.cycle.detection_mode, DetectionMode::All);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = MonitorConfig::default();
        config.energy_detector.on_multiplier = 1.0;
        config.alerts.vibration_critical = 1.0;
        config.trend_detector.ema_alpha = 0.0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("on_multiplier")));
                assert!(errors.iter().any(|e| e.contains("alerts.vibration")));
                assert!(errors.iter().any(|e| e.contains("trend_detector.ema_alpha")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut config = MonitorConfig::default();
        config.alerts.temperature_warning = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_lists_each_error() {
        let err = ConfigError::Validation(vec!["a".to_string(), "b".to_string()]);
        let text = err.to_string();
        assert!(text.contains("  - a"));
        assert!(text.contains("  - b"));
    }
}
