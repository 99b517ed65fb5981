//! Scripted / recorded readings.
//!
//! CSV format, one reading per line:
//!
//! ```text
//! channel,value
//! temperature,71.8
//! vibration,512
//! ```
//!
//! Blank lines and `#` comments are skipped. Each channel is an independent
//! FIFO; reading a drained channel reports `Exhausted`.

use std::collections::VecDeque;
use std::path::Path;

use super::{AcquisitionError, SensorSource};
use crate::types::Channel;

#[derive(Debug, Default)]
pub struct ReplaySource {
    temperature: VecDeque<f64>,
    vibration: VecDeque<f64>,
}

impl ReplaySource {
    pub fn scripted(temperature: Vec<f64>, vibration: Vec<f64>) -> Self {
        Self {
            temperature: temperature.into(),
            vibration: vibration.into(),
        }
    }

    /// Load a `channel,value` CSV recording.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Replay(format!("{}: {e}", path.display())))?;
        let source = Self::parse(&text);
        tracing::info!(
            path = %path.display(),
            temperature = source.temperature.len(),
            vibration = source.vibration.len(),
            "Loaded replay recording"
        );
        Ok(source)
    }

    /// Parse CSV text, skipping (and logging) malformed lines.
    pub fn parse(text: &str) -> Self {
        let mut source = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || (idx == 0 && line.starts_with("channel")) {
                continue;
            }
            match parse_line(line) {
                Ok((Channel::Temperature, v)) => source.temperature.push_back(v),
                Ok((Channel::Vibration, v)) => source.vibration.push_back(v),
                Err(e) => tracing::warn!(line = idx + 1, error = %e, "Skipping malformed replay line"),
            }
        }
        source
    }

    /// Readings left for `channel`.
    pub fn remaining(&self, channel: Channel) -> usize {
        match channel {
            Channel::Temperature => self.temperature.len(),
            Channel::Vibration => self.vibration.len(),
        }
    }
}

fn parse_line(line: &str) -> Result<(Channel, f64), String> {
    let (channel, value) = line
        .split_once(',')
        .ok_or_else(|| "expected 'channel,value'".to_string())?;
    let channel: Channel = channel.parse()?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value '{}': {e}", value.trim()))?;
    Ok((channel, value))
}

impl SensorSource for ReplaySource {
    fn read(&mut self, channel: Channel) -> Result<f64, AcquisitionError> {
        let queue = match channel {
            Channel::Temperature => &mut self.temperature,
            Channel::Vibration => &mut self.vibration,
        };
        queue.pop_front().ok_or(AcquisitionError::Exhausted(channel))
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_channels_and_skips_noise() {
        let text = "channel,value\n\
                    # warmup\n\
                    temperature,71.5\n\
                    vibration,512\n\
                    \n\
                    pressure,3\n\
                    temperature,abc\n\
                    t,72.0\n";
        let mut source = ReplaySource::parse(text);
        assert_eq!(source.remaining(Channel::Temperature), 2);
        assert_eq!(source.remaining(Channel::Vibration), 1);
        assert!((source.read(Channel::Temperature).expect("t0") - 71.5).abs() < f64::EPSILON);
        assert!((source.read(Channel::Temperature).expect("t1") - 72.0).abs() < f64::EPSILON);
        assert!(matches!(
            source.read(Channel::Temperature),
            Err(AcquisitionError::Exhausted(Channel::Temperature))
        ));
    }

    #[test]
    fn test_from_csv_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "temperature,80\nvibration,500\nvibration,501\n").expect("write");
        let source = ReplaySource::from_csv(&path).expect("load");
        assert_eq!(source.remaining(Channel::Vibration), 2);
    }

    #[test]
    fn test_missing_file_is_replay_error() {
        assert!(matches!(
            ReplaySource::from_csv("/nonexistent/run.csv"),
            Err(AcquisitionError::Replay(_))
        ));
    }
}
