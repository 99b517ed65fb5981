//! Sled-backed durable store.

use std::path::Path;
use std::sync::Arc;

use super::{Blob, Store, StoreError};

/// Durable store on top of a single sled tree.
///
/// Writes are not flushed individually; sled flushes in the background and
/// `flush()` is called on shutdown. A crash loses at most the last few
/// writes, which the next cycle regenerates.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        tracing::info!(path = ?path.as_ref(), keys = db.len(), "Store opened");
        Ok(Self { db: Arc::new(db) })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Drop every key.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }

    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl Store for SledStore {
    fn load(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn append(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.update_and_fetch(key, |old| {
            let mut next = old.map(<[u8]>::to_vec).unwrap_or_default();
            next.extend_from_slice(value);
            Some(next)
        })?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.db.contains_key(key)?)
    }

    fn count(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut n = 0;
        for item in self.db.scan_prefix(prefix).keys() {
            item?;
            n += 1;
        }
        Ok(n)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_exists() {
        let dir = tempdir().expect("tempdir");
        let store = SledStore::open(dir.path().join("db")).expect("open");

        assert!(!store.exists("cycle/counter").expect("exists"));
        store.save("cycle/counter", b"7").expect("save");
        assert!(store.exists("cycle/counter").expect("exists"));
        assert_eq!(store.load("cycle/counter").expect("load"), Some(b"7".to_vec()));
    }

    #[test]
    fn test_append_and_prefix_count() {
        let dir = tempdir().expect("tempdir");
        let store = SledStore::open(dir.path().join("db")).expect("open");

        store.append("cycle/journal", b"a\n").expect("append");
        store.append("cycle/journal", b"b\n").expect("append");
        assert_eq!(store.load("cycle/journal").expect("load"), Some(b"a\nb\n".to_vec()));

        for i in 0..3 {
            store.save(&format!("vibration/data/{i}"), b"[]").expect("save");
        }
        store.save("vibration/baseline", b"[]").expect("save");
        assert_eq!(store.count("vibration/data/").expect("count"), 3);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("db");
        {
            let store = SledStore::open(&path).expect("open");
            store.save("detector/energy_baseline", b"12.5").expect("save");
            store.flush().expect("flush");
        }
        let store = SledStore::open(&path).expect("reopen");
        assert_eq!(
            store.load("detector/energy_baseline").expect("load"),
            Some(b"12.5".to_vec())
        );
    }
}
