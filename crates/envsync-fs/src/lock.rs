//! Advisory lock serializing synchronization runs against one destination

use std::fs::{self, File, OpenOptions};
use std::time::Duration;

use backoff::ExponentialBackoff;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Exclusive advisory lock held for the duration of a sync run.
///
/// The lock is an `fs2` exclusive lock on a lock file; it is released when
/// the guard is dropped. Two runs in the same process also exclude each other
/// because every acquisition opens its own file handle.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: NormalizedPath,
}

impl SyncLock {
    /// Try once to take the lock.
    ///
    /// # Errors
    ///
    /// [`Error::LockFailed`] when another holder owns the lock, or an I/O
    /// error when the lock file cannot be created.
    pub fn try_acquire(path: &NormalizedPath) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.try_lock_exclusive().map_err(|_| Error::LockFailed {
            path: path.to_native(),
        })?;
        tracing::debug!(path = %path, "sync lock acquired");
        Ok(Self {
            file,
            path: path.clone(),
        })
    }

    /// Take the lock, retrying with exponential backoff until `timeout`.
    pub fn acquire(path: &NormalizedPath, timeout: Duration) -> Result<Self> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(25),
            max_interval: Duration::from_millis(500),
            max_elapsed_time: Some(timeout),
            ..ExponentialBackoff::default()
        };

        backoff::retry(policy, || {
            Self::try_acquire(path).map_err(|e| match e {
                Error::LockFailed { .. } => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        })
        .map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path, error = %e, "failed to release sync lock");
        }
    }
}

fn open_lock_file(path: &NormalizedPath) -> Result<File> {
    let native = path.to_native();
    if let Some(parent) = native.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&native)
        .map_err(|e| Error::io(&native, e))
}
