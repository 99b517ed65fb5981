//! Shared data structures for the duty-cycle monitor
//!
//! - `Channel`: the two analog proxies the monitor samples
//! - `CycleRecord`: the immutable summary of one completed run cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Surface temperature probe (°F)
    Temperature,
    /// Piezoelectric vibration pickup (raw ADC counts)
    Vibration,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Vibration => write!(f, "vibration"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" | "t" => Ok(Self::Temperature),
            "vibration" | "vib" | "v" => Ok(Self::Vibration),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// Summary of one completed cycle, appended to the cycle journal.
///
/// Scores are `None` while their baseline population is still being built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Cycle number (0-based, persisted across restarts)
    pub cycle: u64,
    pub completed_at: DateTime<Utc>,
    /// Dominant frequency of the last spectrum of the cycle (Hz)
    pub dominant_frequency_hz: Option<f64>,
    /// Temperature slope (°F per reading)
    pub temperature_slope: Option<f64>,
    pub temperature_z: Option<f64>,
    /// Mean per-window vibration score over the cycle
    pub vibration_score: Option<f64>,
    /// Vibration windows transformed during the cycle
    pub windows: u32,
    pub temperature_samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_accepts_short_names() {
        assert_eq!("temp".parse::<Channel>(), Ok(Channel::Temperature));
        assert_eq!(" Vibration ".parse::<Channel>(), Ok(Channel::Vibration));
        assert!("pressure".parse::<Channel>().is_err());
    }

    #[test]
    fn test_cycle_record_json_uses_plain_fields() {
        let record = CycleRecord {
            cycle: 4,
            completed_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
            dominant_frequency_hz: Some(86.0),
            temperature_slope: Some(0.05),
            temperature_z: None,
            vibration_score: None,
            windows: 58,
            temperature_samples: 120,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["cycle"], 4);
        assert!(json["temperature_z"].is_null());
    }
}
