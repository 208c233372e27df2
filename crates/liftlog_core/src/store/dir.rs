//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK        # Advisory lock held by the open connection
//! └─ store.log   # Commit log
//! ```
//!
//! The LOCK file ensures only one connection uses the store at a time. A
//! lock held elsewhere is the "blocked" condition.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusively locked store directory.
///
/// The lock is released when the `StoreDir` is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the directory doesn't exist and `create_if_missing` is false
    /// - another connection holds the lock (`Blocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::Blocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Like [`open`](Self::open), but keeps retrying while the store is
    /// blocked, for up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Blocked` if the lock is still held when `timeout` elapses.
    pub fn open_waiting(path: &Path, create_if_missing: bool, timeout: Duration) -> CoreResult<Self> {
        let deadline = Instant::now() + timeout;
        let mut warned = false;
        loop {
            match Self::open(path, create_if_missing) {
                Err(CoreError::Blocked) if Instant::now() < deadline => {
                    if !warned {
                        warn!(
                            path = %path.display(),
                            "store is held by another connection; waiting for it to close"
                        );
                        warned = true;
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                other => return other,
            }
        }
    }

    /// Path of the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.join("LOCK").exists());
        assert_eq!(dir.log_path(), path.join("store.log"));
    }

    #[test]
    fn refuses_missing_directory_without_create() {
        let temp = tempdir().unwrap();
        let result = StoreDir::open(&temp.path().join("absent"), false);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn second_open_is_blocked() {
        let temp = tempdir().unwrap();
        let _held = StoreDir::open(temp.path(), true).unwrap();
        let start = Instant::now();
        let result = StoreDir::open_waiting(temp.path(), true, Duration::from_millis(120));
        assert!(matches!(result, Err(CoreError::Blocked)));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(StoreDir::open(temp.path(), true).unwrap());
        assert!(StoreDir::open(temp.path(), true).is_ok());
    }
}
