use std::path::Path;

use restore_core::{AssetKey, LoopMap};

use crate::Result;

/// Attaches the image files of a clone to loop devices.
pub trait LoopManager: Send + Sync {
    /// Attaches one loop device per image under `mountpoint`, layering a
    /// decrypting mapping on top when `encrypted` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if any image cannot be attached.
    fn attach(&self, asset: &AssetKey, mountpoint: &Path, encrypted: bool) -> Result<LoopMap>;

    /// Detaches every loop device whose backing file lies under `mountpoint`.
    /// A device that fails does not keep the others attached.
    ///
    /// # Errors
    ///
    /// Returns an error if any device could not be detached.
    fn detach(&self, mountpoint: &Path) -> Result<()>;

    /// Loop devices currently attached to images under `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if attached devices cannot be listed, or
    /// [`crate::OperationError::UnmappedLoopDevice`] if a device's block
    /// device is missing.
    fn find_attached(&self, mountpoint: &Path) -> Result<LoopMap>;
}
