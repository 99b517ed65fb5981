//! Compressor Monitor: duty-cycle anomaly detection
//!
//! Watches a refrigeration compressor through two cheap proxies, a surface
//! temperature probe and a piezo pickup, and reports drift from its own
//! learned behaviour.
//!
//! ## Architecture
//!
//! - **Acquisition**: sensor sources (simulated, CSV replay) behind a
//!   plausibility-gated `Sampler`
//! - **Processing**: in-place radix-2 FFT and dominant-frequency extraction
//! - **Detection**: EMA-baselined energy and temperature-trend detectors with
//!   hysteresis
//! - **Statistics**: per-cycle temperature slope and spectral distance scored
//!   against persisted populations
//! - **Cycle**: the Idle → Collecting → Analyzing → Resting state machine
//! - **Notify**: bounded bridge to an async chat worker

pub mod acquisition;
pub mod config;
pub mod cycle;
pub mod detection;
pub mod notify;
pub mod processing;
pub mod statistics;
pub mod storage;
pub mod types;

pub use config::MonitorConfig;
pub use cycle::{ControlContext, CycleController, CyclePhase};
pub use notify::{notification_bridge, NotificationWorker, StatusMessage};
pub use storage::{MemoryStore, SledStore, Store};
pub use types::{Channel, CycleRecord};
