//! Exclusive delivery ownership of an on-disk outbox.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Advisory lock on `<db>.lock`, held for as long as the value lives.
///
/// Only the holder may claim items, finish attempts, or reset `SENDING`
/// rows left behind by a crash. Read-only handles never take it.
#[derive(Debug)]
pub struct OwnerLock {
    file: File,
    path: PathBuf,
}

impl OwnerLock {
    /// Lock file location for a database path.
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock without blocking; fails with [`Error::Locked`] when
    /// another handle already owns the store.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = Self::path_for(db_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Locked(format!(
                "another process is delivering from {}",
                db_path.display()
            ))
        })?;

        tracing::debug!("Acquired outbox lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release outbox lock {}: {error}", self.path.display());
        }
    }
}
