//! Sensor data acquisition
//!
//! `SensorSource` abstracts where analog readings come from; `Sampler` wraps a
//! source with the plausibility gate and retry policy the control loop
//! relies on.

mod replay;
mod sampler;
mod simulated;

pub use replay::ReplaySource;
pub use sampler::Sampler;
pub use simulated::{SimulatedCompressor, SimulationProfile};

use crate::types::Channel;

/// Acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// The device returned nothing usable for this read.
    #[error("{channel} read failed: {reason}")]
    Read { channel: Channel, reason: String },

    /// Every re-sample attempt fell outside the plausible range.
    #[error("temperature {last:.1} outside plausible range after {attempts} attempts")]
    OutOfRange { last: f64, attempts: u32 },

    /// A finite source (replay) has no more data for this channel.
    #[error("{0} source exhausted")]
    Exhausted(Channel),

    #[error("replay file error: {0}")]
    Replay(String),
}

/// Where raw analog readings come from.
pub trait SensorSource: Send {
    /// Read one raw value from `channel`.
    fn read(&mut self, channel: Channel) -> Result<f64, AcquisitionError>;

    /// Human-readable name for logging (e.g. "simulated", "replay").
    fn source_name(&self) -> &str;
}
