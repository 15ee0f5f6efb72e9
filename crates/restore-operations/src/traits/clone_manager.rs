use restore_core::CloneSpec;

use crate::Result;

/// Creates and destroys copy-on-write clones of asset snapshots.
pub trait CloneManager: Send + Sync {
    /// Clones the spec's source snapshot and mounts it at the spec's
    /// mountpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone cannot be created.
    fn create(&self, spec: &CloneSpec) -> Result<()>;

    /// Destroys the clone and everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone cannot be destroyed.
    fn destroy(&self, spec: &CloneSpec) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the clone's existence cannot be determined.
    fn exists(&self, spec: &CloneSpec) -> Result<bool>;

    /// Every clone in the pool, whatever created it.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be listed.
    fn list_all(&self) -> Result<Vec<CloneSpec>>;
}
