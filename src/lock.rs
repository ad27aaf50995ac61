// src/lock.rs

//! Exclusive lock on the state directory
//!
//! Two tendril processes sharing one base directory would race on the build
//! cache and the checkouts. Every command that touches state holds this lock
//! for its whole run.
//!
//! # Example
//!
//! ```ignore
//! use tendril::SessionLock;
//!
//! let lock = SessionLock::acquire(config.lock_path())?;
//! // ... run the operation ...
//! // Lock released on drop
//! ```

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Advisory exclusive lock held for the lifetime of the value
pub struct SessionLock {
    // Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Acquire the lock, blocking until it is available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        file.lock_exclusive()
            .map_err(|e| Error::LockError(format!("Failed to lock {}: {}", path.display(), e)))?;

        info!("Acquired session lock at {}", path.display());
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired session lock at {}", path.display());
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Session lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::LockError(format!(
                "Failed to try-lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}
