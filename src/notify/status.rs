//! Status assessment from the per-cycle anomaly scores.

use serde::{Deserialize, Serialize};

use crate::config::AlertConfig;

/// Severity level of a completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum AnomalyLevel {
    /// Both scores below their warning bands
    #[default]
    Normal,
    /// One score at or above its warning band
    Warning,
    /// A score at or above its critical band, or both in their warning bands
    Critical,
}

impl std::fmt::Display for AnomalyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Classify a cycle. Missing scores (population still being built) count
/// as unremarkable.
pub fn assess(temperature_z: Option<f64>, vibration_z: Option<f64>, bands: &AlertConfig) -> AnomalyLevel {
    let t = temperature_z.filter(|z| z.is_finite()).unwrap_or(0.0);
    let v = vibration_z.filter(|z| z.is_finite()).unwrap_or(0.0);

    let t_warn = t >= bands.temperature_warning;
    let v_warn = v >= bands.vibration_warning;

    if t >= bands.temperature_critical || v >= bands.vibration_critical || (t_warn && v_warn) {
        AnomalyLevel::Critical
    } else if t_warn || v_warn {
        AnomalyLevel::Warning
    } else {
        AnomalyLevel::Normal
    }
}
