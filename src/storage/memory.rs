//! In-memory store for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{Blob, Store, StoreError};

/// Thread-safe via `RwLock`. Not durable.
///
/// Can be switched read-only to exercise the "store failure is logged and
/// the cycle continues" paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Blob>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all writes with `StoreError::ReadOnly` while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(e.to_string())
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn append(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(value);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }

    fn count(&self, prefix: &str) -> Result<usize, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .count())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_count_ignores_neighbours() {
        let store = MemoryStore::new();
        store.save("vibration/baseline", b"[]").expect("save");
        store.save("vibration/data/0", b"[]").expect("save");
        store.save("vibration/data/1", b"[]").expect("save");
        store.save("vibration/datum", b"[]").expect("save");
        assert_eq!(store.count("vibration/data/").expect("count"), 2);
    }

    #[test]
    fn test_read_only_rejects_writes_but_allows_reads() {
        let store = MemoryStore::new();
        store.save("k", b"v").expect("save");
        store.set_read_only(true);

        assert!(matches!(store.save("k", b"w"), Err(StoreError::ReadOnly)));
        assert!(matches!(store.append("k", b"w"), Err(StoreError::ReadOnly)));
        assert_eq!(store.load("k").expect("load"), Some(b"v".to_vec()));

        store.set_read_only(false);
        store.append("k", b"w").expect("append");
        assert_eq!(store.load("k").expect("load"), Some(b"vw".to_vec()));
    }
}
