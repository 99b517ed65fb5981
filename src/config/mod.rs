//! Monitor Configuration Module
//!
//! Operator-tunable thresholds, intervals and detector constants loaded from
//! TOML.
//!
//! ## Loading Order
//!
//! 1. `COMPRESSOR_CONFIG` environment variable (path to TOML file)
//! 2. `monitor_config.toml` in the current working directory
//! 3. Built-in defaults (the firmware constants)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(MonitorConfig::load());
//!
//! // Anywhere in the codebase:
//! let alpha = config::get().energy_detector.ema_alpha;
//! ```

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;

use std::sync::OnceLock;

/// Global monitor configuration, initialized once at startup.
static MONITOR_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize the global monitor configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: MonitorConfig) {
    if MONITOR_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global monitor configuration.
///
/// Falls back to the built-in defaults if `init()` was never called.
pub fn get() -> &'static MonitorConfig {
    MONITOR_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        MonitorConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    MONITOR_CONFIG.get().is_some()
}
