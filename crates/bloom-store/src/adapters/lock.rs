//! # Storage Process Locking
//!
//! Keeps a second process from opening the same filter image for writing.
//! Two writers would race on `<path>.tmp` during a flush, or interleave
//! byte writes in direct mode.
//!
//! Uses `fs2` for cross-platform advisory locking (flock on Unix, LockFile on
//! Windows) on a sidecar `<path>.lock` file holding the owner's PID.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::adapters::storage::file::{ensure_parent, with_suffix};
use crate::error::{FilterError, FilterResult};

// =============================================================================
// STORAGE LOCK
// =============================================================================

/// Exclusive advisory lock on a filter image.
///
/// Held for the lifetime of the engine, released on drop (RAII). The lock
/// file itself is left in place.
#[derive(Debug)]
pub struct StorageLock {
    /// Kept open to hold the lock
    file: File,
    path: PathBuf,
    pid: u32,
}

impl StorageLock {
    const SUFFIX: &'static str = ".lock";

    /// Lock the image at `image_path`, without blocking.
    ///
    /// # Errors
    ///
    /// `Locked` if another handle holds the lock, `Io` if the lock file cannot
    /// be created or written.
    pub fn acquire(image_path: &Path) -> FilterResult<Self> {
        ensure_parent(image_path)?;
        let lock_path = with_suffix(image_path, Self::SUFFIX);

        // Not truncated before locking, so a contender can still read the PID
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| FilterError::io(&lock_path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(FilterError::Locked {
                pid: Self::read_existing_pid(&lock_path),
                path: lock_path,
            });
        }

        let pid = std::process::id();
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", pid))
            .and_then(|_| file.sync_all())
            .map_err(|e| FilterError::io(&lock_path, e))?;

        debug!(path = %lock_path.display(), pid, "Storage lock acquired");

        Ok(Self {
            file,
            path: lock_path,
            pid,
        })
    }

    /// PID recorded in the lock file
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "Storage lock released");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lock_acquire_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("filter.bloom");

        let lock = StorageLock::acquire(&image).expect("Should acquire lock");
        assert_eq!(lock.path(), dir.path().join("filter.bloom.lock"));
        assert!(lock.path().exists());
        assert_eq!(lock.pid(), std::process::id());
    }

    #[test]
    fn test_lock_contains_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StorageLock::acquire(&dir.path().join("filter.bloom")).unwrap();

        let content = fs::read_to_string(lock.path()).unwrap();
        let stored_pid: u32 = content.trim().parse().unwrap();
        assert_eq!(stored_pid, std::process::id());
    }

    #[test]
    fn test_double_lock_fails_and_reports_pid() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("filter.bloom");

        let _first = StorageLock::acquire(&image).expect("First lock should succeed");
        let result = StorageLock::acquire(&image);

        match result {
            Err(FilterError::Locked { pid, path }) => {
                assert_eq!(pid, Some(std::process::id()));
                assert_eq!(path, dir.path().join("filter.bloom.lock"));
            }
            other => panic!("expected Locked, got {:?}", other),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("filter.bloom");
        {
            let _lock = StorageLock::acquire(&image).expect("Should acquire");
        }
        let lock = StorageLock::acquire(&image).expect("Should acquire after release");
        assert!(lock.path().exists(), "lock file stays on disk");
    }

    #[test]
    fn test_lock_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("nested").join("filter.bloom");
        let lock = StorageLock::acquire(&image).unwrap();
        assert!(lock.path().exists());
    }
}
