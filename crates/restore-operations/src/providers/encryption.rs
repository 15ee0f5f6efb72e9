use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use restore_core::AssetKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::Result;
use crate::error::OperationError;
use crate::traits::EncryptionService;

const KEY_FILE_EXTENSION: &str = "toml";
const STASH_EXTENSION: &str = "key";
const TEMP_ACCESS_EXTENSION: &str = "tempaccess";

/// Per-asset key file. The volume key is stored XOR-wrapped with a digest
/// of the passphrase.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    salt: String,
    passphrase_sha256: String,
    wrapped_key: String,
}

/// Encryption state backed by key files on disk.
///
/// An asset is encrypted when it has a key file in `keys_dir`. Unsealing
/// writes the volume key to `stash_dir`, where the loop manager picks it up;
/// a marker file next to it means the asset was unlocked for temporary
/// access.
pub struct KeyStashEncryptionService {
    keys_dir: PathBuf,
    stash_dir: PathBuf,
}

impl KeyStashEncryptionService {
    #[must_use]
    pub fn new(keys_dir: impl Into<PathBuf>, stash_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            stash_dir: stash_dir.into(),
        }
    }

    /// Path of the unsealed key for `asset`, present only while unsealed.
    #[must_use]
    pub fn stash_path(stash_dir: &Path, asset: &AssetKey) -> PathBuf {
        stash_dir.join(format!("{asset}.{STASH_EXTENSION}"))
    }

    /// Generates a volume key for `asset` protected by `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be written.
    pub fn enroll(&self, asset: &AssetKey, passphrase: &str) -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 16];
        let mut volume_key = [0u8; 32];
        rng.fill(&mut salt);
        rng.fill(&mut volume_key);

        let wrapping = wrapping_key(&salt, passphrase);
        let wrapped: Vec<u8> = volume_key
            .iter()
            .zip(wrapping.iter())
            .map(|(k, w)| k ^ w)
            .collect();

        let key_file = KeyFile {
            salt: hex::encode(salt),
            passphrase_sha256: hex::encode(passphrase_digest(&salt, passphrase)),
            wrapped_key: hex::encode(wrapped),
        };

        let path = self.key_file_path(asset);
        let content =
            toml::to_string_pretty(&key_file).map_err(|source| OperationError::TomlSerialize {
                path: path.clone(),
                source,
            })?;
        write_file(&path, content.as_bytes())?;
        info!(%asset, "enrolled encryption key");
        Ok(())
    }

    /// Marks `asset` as unlocked out of band.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn enable_temp_access(&self, asset: &AssetKey) -> Result<()> {
        write_file(&self.temp_access_path(asset), b"")
    }

    fn key_file_path(&self, asset: &AssetKey) -> PathBuf {
        self.keys_dir
            .join(format!("{asset}.{KEY_FILE_EXTENSION}"))
    }

    fn temp_access_path(&self, asset: &AssetKey) -> PathBuf {
        self.stash_dir
            .join(format!("{asset}.{TEMP_ACCESS_EXTENSION}"))
    }

    fn load_key_file(&self, asset: &AssetKey) -> Result<KeyFile> {
        let path = self.key_file_path(asset);
        let content = fs::read_to_string(&path).map_err(|source| OperationError::FileRead {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| OperationError::TomlParse { path, source })
    }
}

impl EncryptionService for KeyStashEncryptionService {
    fn is_encrypted(&self, asset: &AssetKey) -> Result<bool> {
        Ok(self.key_file_path(asset).is_file())
    }

    fn is_temp_access_enabled(&self, asset: &AssetKey) -> Result<bool> {
        Ok(self.temp_access_path(asset).is_file())
    }

    fn unseal(&self, asset: &AssetKey, passphrase: &str) -> Result<()> {
        let key_file = self.load_key_file(asset)?;
        let malformed = |field: &'static str| OperationError::KeyFileCorrupt {
            asset: asset.clone(),
            field,
        };

        let salt = hex::decode(&key_file.salt).map_err(|_| malformed("salt"))?;
        let expected =
            hex::decode(&key_file.passphrase_sha256).map_err(|_| malformed("passphrase_sha256"))?;
        let wrapped = hex::decode(&key_file.wrapped_key).map_err(|_| malformed("wrapped_key"))?;

        if passphrase_digest(&salt, passphrase).as_slice() != expected.as_slice() {
            return Err(OperationError::InvalidPassphrase(asset.clone()));
        }

        let wrapping = wrapping_key(&salt, passphrase);
        let volume_key: Vec<u8> = wrapped
            .iter()
            .zip(wrapping.iter())
            .map(|(k, w)| k ^ w)
            .collect();

        write_file(
            &Self::stash_path(&self.stash_dir, asset),
            hex::encode(volume_key).as_bytes(),
        )?;
        info!(%asset, "unsealed asset");
        Ok(())
    }

    fn seal(&self, asset: &AssetKey) -> Result<()> {
        let path = Self::stash_path(&self.stash_dir, asset);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(%asset, "sealed asset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%asset, "asset already sealed");
                Ok(())
            }
            Err(source) => Err(OperationError::FileWrite { path, source }),
        }
    }
}

fn passphrase_digest(salt: &[u8], passphrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(passphrase.as_bytes());
    hasher.finalize().into()
}

fn wrapping_key(salt: &[u8], passphrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"wrap:");
    hasher.update(passphrase.as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let write_error = |source| OperationError::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(write_error)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(content).map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
