//! Process lock file
//!
//! Two monitors must never open the same sled directory; sled would refuse
//! the second open with an opaque lock error. The lock records the owning
//! PID so a crashed instance's lock can be recognised as stale.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".compressor-monitor.lock";

    /// Acquire the lock for `data_dir`, creating the directory if needed.
    ///
    /// Fails if another live monitor holds it.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Ok(Some(pid)) => bail!(
                    "Another compressor monitor is already using {} (PID: {pid}).\n\
                     Stop it, or remove the stale lock file: rm {}",
                    data_dir.display(),
                    lock_path.display()
                ),
                Ok(None) => {
                    tracing::info!("Removing stale lock file from previous instance");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable lock file, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write lock file: {}", lock_path.display()))?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID of a live monitor holding the lock, `None` when stale.
    fn holder(lock_path: &Path) -> Result<Option<u32>> {
        let contents = fs::read_to_string(lock_path).context("Failed to read lock file")?;
        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;
        Ok(Self::is_monitor_running(pid).then_some(pid))
    }

    #[cfg(unix)]
    fn is_monitor_running(pid: u32) -> bool {
        // A live PID running something else means the PID was recycled
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("compressor"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_monitor_running(_pid: u32) -> bool {
        true
    }

    /// Release the lock (also done on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_records_pid_and_releases_on_drop() {
        let dir = tempdir().expect("tempdir");
        let path = {
            let lock = ProcessLock::acquire(dir.path()).expect("acquire");
            let pid: u32 = fs::read_to_string(lock.path())
                .expect("read")
                .trim()
                .parse()
                .expect("pid");
            assert_eq!(pid, std::process::id());
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "999999999\n").expect("write");
        let lock = ProcessLock::acquire(dir.path()).expect("acquire over stale lock");
        assert!(lock.path().exists());
    }

    #[test]
    fn test_garbage_lock_is_replaced() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "not a pid").expect("write");
        assert!(ProcessLock::acquire(dir.path()).is_ok());
    }
}
