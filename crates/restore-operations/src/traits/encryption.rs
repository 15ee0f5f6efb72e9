use restore_core::AssetKey;

use crate::Result;

/// Access to the key material of encrypted assets.
pub trait EncryptionService: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the asset's encryption state cannot be read.
    fn is_encrypted(&self, asset: &AssetKey) -> Result<bool>;

    /// Whether the asset was unlocked out of band and needs no passphrase.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary access state cannot be read.
    fn is_temp_access_enabled(&self, asset: &AssetKey) -> Result<bool>;

    /// Makes the asset's key available to the loop manager.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidPassphrase`](crate::OperationError::InvalidPassphrase)
    /// if the passphrase does not match.
    fn unseal(&self, asset: &AssetKey, passphrase: &str) -> Result<()>;

    /// Removes the unsealed key again.
    ///
    /// # Errors
    ///
    /// Returns an error if the unsealed key cannot be removed.
    fn seal(&self, asset: &AssetKey) -> Result<()>;
}
