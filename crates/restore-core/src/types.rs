use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Restore record option holding the name of the published network target.
pub const TARGET_OPTION: &str = "target";

/// Identifier of a protected asset (agent or share).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetKey(String);

impl AssetKey {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAssetKey`] if the key is empty or contains
    /// characters that cannot appear in dataset or target names.
    pub fn new(key: impl Into<String>) -> Result<Self, CoreError> {
        let key = key.into();
        let valid = !key.is_empty()
            && !key.starts_with(['-', '.'])
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(Self(key))
        } else {
            Err(CoreError::InvalidAssetKey(key))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.0
    }
}

impl FromStr for AssetKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreType {
    DifferentialRollback,
}

impl RestoreType {
    /// Suffix appended to clone and target names for this restore type.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::DifferentialRollback => "diffrollback",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DifferentialRollback => "differential-rollback",
        }
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownRestoreType`] if no restore type uses `suffix`.
    pub fn from_suffix(suffix: &str) -> Result<Self, CoreError> {
        match suffix {
            "diffrollback" => Ok(Self::DifferentialRollback),
            other => Err(CoreError::UnknownRestoreType(other.to_string())),
        }
    }
}

impl fmt::Display for RestoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "differential-rollback" => Ok(Self::DifferentialRollback),
            other => Self::from_suffix(other),
        }
    }
}

/// Identity of a restore: one record per (asset, snapshot, type).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RestoreKey {
    pub asset: AssetKey,
    pub snapshot: u64,
    pub restore_type: RestoreType,
}

impl RestoreKey {
    #[must_use]
    pub fn new(asset: AssetKey, snapshot: u64, restore_type: RestoreType) -> Self {
        Self {
            asset,
            snapshot,
            restore_type,
        }
    }

    /// File-system safe identifier, also used for lock and record file names.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.asset,
            self.snapshot,
            self.restore_type.suffix()
        )
    }
}

impl fmt::Display for RestoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.asset, self.snapshot, self.restore_type)
    }
}

/// Persisted metadata mapping a restore to the resources that implement it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRecord {
    pub asset: AssetKey,
    pub snapshot: u64,
    pub restore_type: RestoreType,
    /// RFC 3339 creation time.
    pub created_at: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl RestoreRecord {
    #[must_use]
    pub fn new(key: RestoreKey, created_at: impl Into<String>) -> Self {
        Self {
            asset: key.asset,
            snapshot: key.snapshot,
            restore_type: key.restore_type,
            created_at: created_at.into(),
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> RestoreKey {
        RestoreKey::new(self.asset.clone(), self.snapshot, self.restore_type)
    }

    /// Name of the network target backing this restore, if recorded.
    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.options.get(TARGET_OPTION).map(String::as_str)
    }
}

/// A loop device attached to one backing image of a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    /// Volume identifier, taken from the image file stem.
    pub volume_id: String,
    /// The loop device, e.g. `/dev/loop3`.
    pub loop_device: PathBuf,
    /// The image file the loop device reads from.
    pub backing_file: PathBuf,
    /// Device exported as a LUN: the loop device itself, or the decrypting
    /// device-mapper node stacked on top of it.
    pub block_device: PathBuf,
}

/// Attached loop devices of one clone, keyed by volume identifier.
pub type LoopMap = BTreeMap<String, LoopInfo>;

/// A published network block-storage target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub name: String,
    pub password: String,
    pub luns: Vec<PathBuf>,
}
