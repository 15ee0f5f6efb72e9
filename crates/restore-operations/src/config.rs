use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::error::OperationError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/restorectl/config.toml";

/// Settings shared by the providers and the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreConfig {
    /// Storage pool holding the protected datasets.
    pub pool: String,
    /// Directory under which clones are mounted.
    pub mount_root: PathBuf,
    pub records_dir: PathBuf,
    pub lock_dir: PathBuf,
    /// Per-asset key files.
    pub keys_dir: PathBuf,
    /// Runtime stash of unsealed keys.
    pub key_stash_dir: PathBuf,
    pub iqn_prefix: String,
    /// Glob patterns of auxiliary files hidden from published targets.
    pub hide_patterns: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            pool: "homePool".to_string(),
            mount_root: PathBuf::from("/homePool"),
            records_dir: PathBuf::from("/var/lib/restorectl/restores"),
            lock_dir: PathBuf::from("/run/lock/restorectl"),
            keys_dir: PathBuf::from("/var/lib/restorectl/keys"),
            key_stash_dir: PathBuf::from("/run/restorectl/keys"),
            iqn_prefix: "iqn.2007-01.net.restorectl".to_string(),
            hide_patterns: vec![
                "*.checksum".to_string(),
                "*.log".to_string(),
                "*.json".to_string(),
                "*.key".to_string(),
            ],
            retry: RetryPolicy::default(),
        }
    }
}

impl RestoreConfig {
    /// Load the configuration at `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(OperationError::FileRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| OperationError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}
