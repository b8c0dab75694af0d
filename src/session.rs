//! Working-directory lock.
//!
//! Two runs sharing one working directory would interleave writes to the
//! engine's key-value and vector files, so a run holds an exclusive
//! advisory lock on `<working_dir>/.lightrag.lock` for its whole lifetime.
//! The lock file is never deleted, so every run locks the same inode.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};

/// Lock file name inside the working directory.
pub const LOCK_FILE: &str = ".lightrag.lock";

/// Guard that keeps the working directory exclusively locked.
pub struct WorkingDirLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl WorkingDirLock {
    /// Acquire an exclusive lock on the working directory.
    ///
    /// The directory must already exist.
    pub fn acquire(working_dir: &Path) -> Result<Self> {
        let path = working_dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Working directory locked");
                Ok(Self {
                    lock_file: Some(lock_file),
                    path,
                })
            }
            Err(_) => Err(Error::WorkingDirLocked(working_dir.display().to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock manually. The file stays in place.
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            debug!(path = %self.path.display(), "Working directory unlocked");
        }
    }
}

impl Drop for WorkingDirLock {
    fn drop(&mut self) {
        self.release();
    }
}
