//! Exclusive access to a store path
//!
//! Writers of the same destination serialize on an advisory lock held on a
//! sibling `<destination>.lock` file, so a load-merge-write cycle never races
//! another one on the final rename.

use crate::error::StoreError;
use crate::storage::parent_dir;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held lock on a store path. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Block until the lock for `destination` is acquired
    pub fn acquire(destination: &Path) -> Result<Self, StoreError> {
        let file = Self::open(destination)?;
        let path = lock_path(destination);
        FileExt::lock_exclusive(&file).map_err(StoreError::io(&path))?;
        debug!(lock = %path.display(), "store lock acquired");
        Ok(Self { file, path })
    }

    /// Acquire the lock only if no one else holds it
    pub fn try_acquire(destination: &Path) -> Result<Option<Self>, StoreError> {
        let file = Self::open(destination)?;
        let path = lock_path(destination);
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(StoreError::io(&path)(e)),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(destination: &Path) -> Result<File, StoreError> {
        let dir = parent_dir(destination);
        if !dir.is_dir() {
            return Err(StoreError::DirectoryMissing(dir));
        }
        let path = lock_path(destination);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(StoreError::io(&path))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(lock = %self.path.display(), "failed to release store lock: {}", e);
        }
    }
}

/// `<destination>.lock`
pub fn lock_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".lock");
    destination.with_file_name(name)
}
