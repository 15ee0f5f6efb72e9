use std::fmt;
use std::path::{Path, PathBuf};

use restore_core::{
    AssetKey, CloneSpec, LoopMap, RestoreKey, RestoreRecord, TargetInfo, target_name,
};

/// Input of one provisioning run.
#[derive(Clone)]
pub struct RestoreRequest {
    pub asset: AssetKey,
    pub snapshot: u64,
    /// Needed only for encrypted assets without temporary access.
    pub passphrase: Option<String>,
}

impl RestoreRequest {
    #[must_use]
    pub fn new(asset: AssetKey, snapshot: u64) -> Self {
        Self {
            asset,
            snapshot,
            passphrase: None,
        }
    }

    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

impl fmt::Debug for RestoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreRequest")
            .field("asset", &self.asset)
            .field("snapshot", &self.snapshot)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// State shared by the stages of one differential-rollback pipeline.
///
/// The inputs are fixed when the context is built. Every output field is
/// written by exactly one stage and read by later stages and by rollback.
pub struct RestoreContext {
    key: RestoreKey,
    spec: CloneSpec,
    mountpoint: PathBuf,
    target_name: String,
    passphrase: Option<String>,

    /// Whether the asset's backing images are encrypted.
    pub encrypted: bool,
    /// Set by the unseal stage once the asset key is available.
    pub unsealed: bool,
    /// Set only when this run created the clone, never for a pre-existing one.
    pub clone_created: bool,
    /// Original paths of files moved out of the mountpoint root.
    pub hidden_files: Vec<PathBuf>,
    pub loops: LoopMap,
    pub target: Option<TargetInfo>,
    pub record: Option<RestoreRecord>,
}

impl RestoreContext {
    #[must_use]
    pub fn new(
        key: RestoreKey,
        pool: &str,
        mount_root: &Path,
        iqn_prefix: &str,
        passphrase: Option<String>,
    ) -> Self {
        let spec = CloneSpec::for_restore(pool, key.asset.clone(), key.snapshot, key.restore_type);
        let mountpoint = spec.mountpoint(mount_root);
        let target_name = target_name(iqn_prefix, &spec);
        Self {
            key,
            spec,
            mountpoint,
            target_name,
            passphrase,
            encrypted: false,
            unsealed: false,
            clone_created: false,
            hidden_files: Vec::new(),
            loops: LoopMap::new(),
            target: None,
            record: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> &RestoreKey {
        &self.key
    }

    #[must_use]
    pub fn asset(&self) -> &AssetKey {
        &self.key.asset
    }

    #[must_use]
    pub fn spec(&self) -> &CloneSpec {
        &self.spec
    }

    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    #[must_use]
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    /// Block devices to export, in volume order.
    #[must_use]
    pub fn lun_paths(&self) -> Vec<PathBuf> {
        self.loops
            .values()
            .map(|info| info.block_device.clone())
            .collect()
    }
}
