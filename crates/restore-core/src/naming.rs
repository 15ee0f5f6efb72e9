use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::{AssetKey, RestoreType};

/// Identifies a clone by asset, source snapshot epoch and suffix.
///
/// Every name derived from a spec is a pure function of its fields, so a
/// later process can find the clone, its mountpoint and its target again
/// without any state from the run that created them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloneSpec {
    pool: String,
    asset: AssetKey,
    snapshot: u64,
    suffix: String,
}

impl CloneSpec {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSuffix`] if `suffix` is empty or contains
    /// anything but lowercase ASCII letters and digits.
    pub fn new(
        pool: impl Into<String>,
        asset: AssetKey,
        snapshot: u64,
        suffix: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let suffix = suffix.into();
        if suffix.is_empty()
            || !suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(CoreError::InvalidSuffix(suffix));
        }
        Ok(Self {
            pool: pool.into(),
            asset,
            snapshot,
            suffix,
        })
    }

    #[must_use]
    pub fn for_restore(
        pool: impl Into<String>,
        asset: AssetKey,
        snapshot: u64,
        restore_type: RestoreType,
    ) -> Self {
        Self {
            pool: pool.into(),
            asset,
            snapshot,
            suffix: restore_type.suffix().to_string(),
        }
    }

    /// Recover a spec from a clone dataset name such as
    /// `tank/A1-1000-diffrollback`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCloneName`] if the dataset is not a clone
    /// in `pool`.
    pub fn parse_dataset(pool: &str, dataset: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidCloneName(dataset.to_string());

        let name = dataset
            .strip_prefix(pool)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        if name.contains('/') {
            return Err(invalid());
        }

        let mut parts = name.rsplitn(3, '-');
        let suffix = parts.next().ok_or_else(invalid)?;
        let snapshot = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let asset = parts
            .next()
            .and_then(|a| AssetKey::new(a).ok())
            .ok_or_else(invalid)?;

        Self::new(pool, asset, snapshot, suffix).map_err(|_| invalid())
    }

    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    #[must_use]
    pub fn asset(&self) -> &AssetKey {
        &self.asset
    }

    #[must_use]
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Dataset holding the asset's live data, e.g. `tank/A1`.
    #[must_use]
    pub fn source_dataset(&self) -> String {
        format!("{}/{}", self.pool, self.asset)
    }

    /// Snapshot the clone is created from, e.g. `tank/A1@1000`.
    #[must_use]
    pub fn source_snapshot(&self) -> String {
        format!("{}@{}", self.source_dataset(), self.snapshot)
    }

    /// Leaf name of the clone, e.g. `A1-1000-diffrollback`.
    #[must_use]
    pub fn clone_name(&self) -> String {
        format!("{}-{}-{}", self.asset, self.snapshot, self.suffix)
    }

    /// Full clone dataset, e.g. `tank/A1-1000-diffrollback`.
    #[must_use]
    pub fn dataset(&self) -> String {
        format!("{}/{}", self.pool, self.clone_name())
    }

    #[must_use]
    pub fn mountpoint(&self, mount_root: &Path) -> PathBuf {
        mount_root.join(self.clone_name())
    }
}

impl fmt::Display for CloneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dataset())
    }
}

/// Name of the network target that publishes a clone.
///
/// IQNs are case-insensitive and may not contain underscores. The asset key
/// is escaped with `.` so distinct keys keep distinct names: `.` becomes
/// `..`, `_` becomes `.-` and an uppercase letter becomes `.` plus its
/// lowercase form.
#[must_use]
pub fn target_name(iqn_prefix: &str, spec: &CloneSpec) -> String {
    let mut asset = String::with_capacity(spec.asset().as_str().len());
    for c in spec.asset().as_str().chars() {
        match c {
            '.' => asset.push_str(".."),
            '_' => asset.push_str(".-"),
            c if c.is_ascii_uppercase() => {
                asset.push('.');
                asset.push(c.to_ascii_lowercase());
            }
            c => asset.push(c),
        }
    }
    format!(
        "{iqn_prefix}:{asset}-{}-{}",
        spec.snapshot(),
        spec.suffix()
    )
}
