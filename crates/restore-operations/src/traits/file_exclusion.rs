use std::path::{Path, PathBuf};

use crate::Result;

/// Hides auxiliary files in a clone so they are not exported.
pub trait FileExclusion: Send + Sync {
    /// Moves every file in the root of `mountpoint` that matches one of
    /// `patterns` out of the way and returns their original paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid or a file cannot be moved.
    fn hide(&self, mountpoint: &Path, patterns: &[String]) -> Result<Vec<PathBuf>>;

    /// Moves previously hidden files back to their original paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be moved back.
    fn reveal(&self, mountpoint: &Path, hidden: &[PathBuf]) -> Result<()>;
}
