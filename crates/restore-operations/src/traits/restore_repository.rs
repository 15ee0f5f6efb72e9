use restore_core::{RestoreKey, RestoreRecord};

use crate::Result;

/// Persistent store of restore records, one per (asset, snapshot, type).
pub trait RestoreRepository: Send + Sync {
    /// Returns `Ok(None)` if no record exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if a record exists but cannot be read.
    fn find(&self, key: &RestoreKey) -> Result<Option<RestoreRecord>>;

    /// Stores `record` only if none exists for its key.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::RestoreAlreadyExists`](crate::OperationError::RestoreAlreadyExists)
    /// if a record with the same key is already stored.
    fn save(&self, record: &RestoreRecord) -> Result<()>;

    /// Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be removed.
    fn delete(&self, key: &RestoreKey) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or a record cannot be read.
    fn list(&self) -> Result<Vec<RestoreRecord>>;
}
