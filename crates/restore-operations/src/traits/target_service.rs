use std::path::PathBuf;

use restore_core::TargetInfo;

use crate::Result;

/// Publishes block devices as network storage targets.
pub trait TargetService: Send + Sync {
    /// Creates target `name` with one LUN per path, protected by `password`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target or any of its LUNs cannot be created.
    fn create_target(&self, name: &str, luns: &[PathBuf], password: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`OperationError::TargetNotFound`](crate::OperationError::TargetNotFound)
    /// if no such target exists.
    fn delete_target(&self, name: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`OperationError::TargetNotFound`](crate::OperationError::TargetNotFound)
    /// if no such target exists.
    fn get_target(&self, name: &str) -> Result<TargetInfo>;

    /// Starts the target service if it is not running.
    ///
    /// # Errors
    ///
    /// Returns an error if the service state cannot be read or it fails to start.
    fn start_if_dead(&self) -> Result<()>;
}
