use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use restore_core::RestoreKey;
use tracing::debug;

use crate::Result;
use crate::error::OperationError;

/// Exclusive advisory lock on one (asset, snapshot, restore type) triple.
///
/// Held for the whole of a provisioning or teardown run so two processes
/// never work on the same restore at once. Released on drop.
#[derive(Debug)]
pub struct ProvisionLock {
    file: File,
    path: PathBuf,
}

impl ProvisionLock {
    #[must_use]
    pub fn path_for(lock_dir: &Path, key: &RestoreKey) -> PathBuf {
        lock_dir.join(format!("{}.lock", key.file_stem()))
    }

    /// Take the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::RestoreLocked`] if another holder has it,
    /// or [`OperationError::Lock`] if the lock file cannot be opened.
    pub fn acquire(lock_dir: &Path, key: &RestoreKey) -> Result<Self> {
        Self::try_acquire(lock_dir, key)?
            .ok_or_else(|| OperationError::RestoreLocked(key.clone()))
    }

    /// Take the lock if it is free.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Lock`] if the lock file cannot be opened or
    /// locking fails for any reason other than contention.
    pub fn try_acquire(lock_dir: &Path, key: &RestoreKey) -> Result<Option<Self>> {
        let path = Self::path_for(lock_dir, key);
        let lock_error = |source| OperationError::Lock {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(lock_dir).map_err(lock_error)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_error)?;

        if !acquired(file.try_lock_exclusive()).map_err(lock_error)? {
            return Ok(None);
        }
        debug!(path = %path.display(), "acquired provisioning lock");
        Ok(Some(Self { file, path }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `Ok(false)` when another holder has the lock; other errors pass through.
fn acquired(result: io::Result<()>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(false),
        Err(e) => Err(e),
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
