//! Persistent store
//!
//! A small key/blob interface for everything the monitor keeps across
//! restarts: detector baselines, raw spectra, slope history, temperature
//! series, the cycle counter, the cycle journal and notifier message ids.
//!
//! Backends:
//! - `SledStore`: durable, used by the binary
//! - `MemoryStore`: in-memory, used by tests

pub mod keys;
pub mod lockfile;
mod memory;
mod sled_store;

pub use lockfile::ProcessLock;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Raw stored value.
pub type Blob = Vec<u8>;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store is read-only")]
    ReadOnly,
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Pluggable key/blob persistence.
///
/// Implementations must be thread-safe; the control loop and the
/// notification worker share one store.
pub trait Store: Send + Sync {
    /// Fetch a value, `None` when the key is absent.
    fn load(&self, key: &str) -> Result<Option<Blob>, StoreError>;

    /// Replace a value.
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Append bytes to a value, creating it when absent.
    fn append(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Number of keys starting with `prefix`.
    fn count(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Load and deserialize a JSON value.
pub fn load_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    match store.load(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and save a JSON value.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;
    store.save(key, &bytes)
}

/// Append one JSON record plus a newline (NDJSON journal).
pub fn append_json_line<T: Serialize + ?Sized>(
    store: &dyn Store,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    store.append(key, &bytes)
}

/// Read back every record of an NDJSON journal, skipping malformed lines.
pub fn read_json_lines<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Vec<T>, StoreError> {
    let Some(bytes) = store.load(key)? else {
        return Ok(Vec::new());
    };
    Ok(bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_slice(line) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "Skipping malformed journal line");
                None
            }
        })
        .collect())
}
