use std::path::PathBuf;
use std::sync::Arc;

use restore_core::{
    AssetKey, CloneSpec, LoopMap, RestoreKey, RestoreRecord, RestoreType, TargetInfo,
    target_name,
};
use restore_transaction::{FailureType, Transaction};
use tracing::{debug, info, warn};

use super::context::{RestoreContext, RestoreRequest};
use super::stages::{
    AttachLoopsStage, CreateCloneStage, HideFilesStage, PersistRecordStage, PublishTargetStage,
    UnsealStage,
};
use crate::Result;
use crate::config::RestoreConfig;
use crate::error::OperationError;
use crate::lock::ProvisionLock;
use crate::providers::{
    FileSystemRestoreRepository, GlobFileExclusion, KeyStashEncryptionService,
    LosetupLoopManager, RandomPasswordGenerator, SystemCommandRunner, TargetcliService,
    ZfsCloneManager,
};
use crate::retry::{retry_with_backoff, transient};
use crate::traits::{
    CloneManager, CommandRunner, EncryptionService, FileExclusion, LoopManager,
    PasswordGenerator, RestoreRepository, TargetService,
};

const RESTORE_TYPE: RestoreType = RestoreType::DifferentialRollback;

/// Collaborators the service drives, injected explicitly.
#[derive(Clone)]
pub struct RestoreServices {
    pub clones: Arc<dyn CloneManager>,
    pub encryption: Arc<dyn EncryptionService>,
    pub loops: Arc<dyn LoopManager>,
    pub targets: Arc<dyn TargetService>,
    pub records: Arc<dyn RestoreRepository>,
    pub exclusion: Arc<dyn FileExclusion>,
    pub passwords: Arc<dyn PasswordGenerator>,
}

impl RestoreServices {
    /// Providers backed by the host's storage, loop and target tooling.
    #[must_use]
    pub fn system(config: &RestoreConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        Self {
            clones: Arc::new(ZfsCloneManager::new(
                Arc::clone(&runner),
                config.pool.clone(),
                config.mount_root.clone(),
            )),
            encryption: Arc::new(KeyStashEncryptionService::new(
                config.keys_dir.clone(),
                config.key_stash_dir.clone(),
            )),
            loops: Arc::new(LosetupLoopManager::new(
                Arc::clone(&runner),
                config.key_stash_dir.clone(),
            )),
            targets: Arc::new(TargetcliService::new(runner)),
            records: Arc::new(FileSystemRestoreRepository::new(config.records_dir.clone())),
            exclusion: Arc::new(GlobFileExclusion::new()),
            passwords: Arc::new(RandomPasswordGenerator::new()),
        }
    }
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRestore {
    pub record: RestoreRecord,
    pub target: TargetInfo,
    pub loops: LoopMap,
    pub mountpoint: PathBuf,
    /// Names of the stages that committed, in order.
    pub stages: Vec<String>,
}

#[derive(Debug)]
pub struct SweepFailure {
    pub clone: String,
    pub error: OperationError,
}

/// Outcome of [`DifferentialRollbackService::sweep_orphans`].
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Orphaned clones that were torn down.
    pub removed: Vec<CloneSpec>,
    /// Orphans whose provisioning lock was held, so likely still in flight.
    pub in_progress: Vec<CloneSpec>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Provisions, reconciles and tears down differential-rollback restores.
pub struct DifferentialRollbackService {
    services: RestoreServices,
    config: RestoreConfig,
}

impl DifferentialRollbackService {
    #[must_use]
    pub fn new(services: RestoreServices, config: RestoreConfig) -> Self {
        Self { services, config }
    }

    #[must_use]
    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    fn key(asset: &AssetKey, snapshot: u64) -> RestoreKey {
        RestoreKey::new(asset.clone(), snapshot, RESTORE_TYPE)
    }

    fn key_for_suffix(asset: &AssetKey, snapshot: u64, suffix: &str) -> Result<RestoreKey> {
        let restore_type = RestoreType::from_suffix(suffix)?;
        Ok(RestoreKey::new(asset.clone(), snapshot, restore_type))
    }

    fn context(&self, key: RestoreKey, passphrase: Option<String>) -> RestoreContext {
        RestoreContext::new(
            key,
            &self.config.pool,
            &self.config.mount_root,
            &self.config.iqn_prefix,
            passphrase,
        )
    }

    /// Provision a restore target for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::RestoreAlreadyExists`] or
    /// [`OperationError::PassphraseRequired`] before any stage runs, or
    /// [`OperationError::PipelineFailed`] after rolling back a failed stage.
    pub fn create(&self, request: RestoreRequest) -> Result<ProvisionedRestore> {
        self.create_with_cancel(request, || false)
    }

    /// Like [`create`](Self::create), checking `cancelled` before each stage.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::PipelineCancelled`] when `cancelled` fires,
    /// after rolling back every committed stage.
    pub fn create_with_cancel<F>(
        &self,
        request: RestoreRequest,
        cancelled: F,
    ) -> Result<ProvisionedRestore>
    where
        F: Fn() -> bool + 'static,
    {
        let key = Self::key(&request.asset, request.snapshot);
        let _lock = ProvisionLock::acquire(&self.config.lock_dir, &key)?;

        if self.services.records.find(&key)?.is_some() {
            return Err(OperationError::RestoreAlreadyExists(key));
        }

        let encrypted = self.services.encryption.is_encrypted(&key.asset)?;
        let needs_unseal =
            encrypted && !self.services.encryption.is_temp_access_enabled(&key.asset)?;
        if needs_unseal && request.passphrase.is_none() {
            return Err(OperationError::PassphraseRequired(key.asset));
        }

        let mut ctx = self.context(key, request.passphrase);
        ctx.encrypted = encrypted;

        let services = &self.services;
        let retry = self.config.retry;
        let mut transaction = Transaction::new(FailureType::StopOnFailure);
        transaction
            .add_if(
                needs_unseal,
                UnsealStage::new(Arc::clone(&services.encryption)),
            )
            .add(CreateCloneStage::new(Arc::clone(&services.clones)))
            .add(HideFilesStage::new(
                Arc::clone(&services.exclusion),
                self.config.hide_patterns.clone(),
            ))
            .add(AttachLoopsStage::new(Arc::clone(&services.loops), retry))
            .add(PublishTargetStage::new(
                Arc::clone(&services.targets),
                Arc::clone(&services.passwords),
                retry,
            ))
            .add(PersistRecordStage::new(Arc::clone(&services.records)))
            .on_cancel(cancelled);

        info!(restore = %ctx.key(), stages = transaction.len(), "provisioning restore");
        let outcome = transaction.commit(&mut ctx);
        debug!(audit = %transaction.audit_log().summary(), "provisioning finished");
        let report = outcome?;

        let (Some(record), Some(target)) = (ctx.record.take(), ctx.target.take()) else {
            return Err(OperationError::Transaction(
                "pipeline finished without a record and target".to_string(),
            ));
        };
        info!(restore = %ctx.key(), target_name = %target.name, "restore provisioned");
        Ok(ProvisionedRestore {
            record,
            target,
            loops: std::mem::take(&mut ctx.loops),
            mountpoint: ctx.mountpoint().to_path_buf(),
            stages: report.committed,
        })
    }

    /// Whether a restore record exists for the triple.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown suffix or an unreadable record store.
    pub fn restore_exists(&self, asset: &AssetKey, snapshot: u64, suffix: &str) -> Result<bool> {
        let key = Self::key_for_suffix(asset, snapshot, suffix)?;
        Ok(self.services.records.find(&key)?.is_some())
    }

    /// Target metadata of an existing restore, republishing the target if
    /// the target service lost it.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::RestoreNotFound`] without a record, and the
    /// original [`OperationError::TargetNotFound`] when the clone is gone too.
    pub fn get_restore_data(
        &self,
        asset: &AssetKey,
        snapshot: u64,
        suffix: &str,
    ) -> Result<TargetInfo> {
        let key = Self::key_for_suffix(asset, snapshot, suffix)?;
        let record = self
            .services
            .records
            .find(&key)?
            .ok_or_else(|| OperationError::RestoreNotFound(key.clone()))?;
        let name = record
            .target_name()
            .ok_or_else(|| OperationError::MissingTargetOption(key.clone()))?;

        match self.services.targets.get_target(name) {
            Err(error) if error.is_target_not_found() => {
                warn!(restore = %key, target_name = name, "target missing, reconciling");
                self.reconcile(key, name, error)
            }
            other => other,
        }
    }

    fn reconcile(
        &self,
        key: RestoreKey,
        name: &str,
        not_found: OperationError,
    ) -> Result<TargetInfo> {
        let _lock = ProvisionLock::acquire(&self.config.lock_dir, &key)?;

        // Another caller may have republished while we waited for the lock.
        match self.services.targets.get_target(name) {
            Err(error) if error.is_target_not_found() => {}
            other => return other,
        }

        let ctx = self.context(key, None);
        if !self.services.clones.exists(ctx.spec())? {
            warn!(clone = %ctx.spec(), "clone is gone too, nothing to reconcile from");
            return Err(not_found);
        }

        let mut loops = match self.services.loops.find_attached(ctx.mountpoint()) {
            Err(OperationError::UnmappedLoopDevice(device)) => {
                warn!(device = %device.display(), "loop device lost its mapping, reattaching");
                retry_with_backoff(&self.config.retry, "detach loops", transient, || {
                    self.services.loops.detach(ctx.mountpoint())
                })?;
                LoopMap::new()
            }
            other => other?,
        };
        if loops.is_empty() {
            let encrypted = self.services.encryption.is_encrypted(ctx.asset())?;
            loops = self
                .services
                .loops
                .attach(ctx.asset(), ctx.mountpoint(), encrypted)?;
            info!(count = loops.len(), "reattached loop devices");
        }

        self.services.targets.start_if_dead()?;
        let password = self.services.passwords.generate();
        let luns: Vec<PathBuf> = loops.values().map(|l| l.block_device.clone()).collect();
        self.services.targets.create_target(name, &luns, &password)?;
        info!(target_name = name, luns = luns.len(), "republished target");

        Ok(TargetInfo {
            name: name.to_string(),
            password,
            luns,
        })
    }

    /// Tear down a restore: target, loops, clone, then the record.
    ///
    /// Steps run in order and the first error is returned; running `remove`
    /// again resumes where the failed attempt stopped.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::RestoreNotFound`] without a record, or the
    /// error of the first failing step.
    pub fn remove(&self, asset: &AssetKey, snapshot: u64, suffix: &str) -> Result<()> {
        let key = Self::key_for_suffix(asset, snapshot, suffix)?;
        let _lock = ProvisionLock::acquire(&self.config.lock_dir, &key)?;
        let record = self
            .services
            .records
            .find(&key)?
            .ok_or_else(|| OperationError::RestoreNotFound(key.clone()))?;

        let ctx = self.context(key, None);
        let name = record.target_name().unwrap_or(ctx.target_name());
        self.teardown(ctx.spec(), name)?;
        self.services.records.delete(ctx.key())?;
        info!(restore = %ctx.key(), "restore removed");
        Ok(())
    }

    fn teardown(&self, spec: &CloneSpec, name: &str) -> Result<()> {
        let retry = &self.config.retry;
        match retry_with_backoff(retry, "delete target", transient, || {
            self.services.targets.delete_target(name)
        }) {
            Ok(()) => {}
            Err(error) if error.is_target_not_found() => {
                debug!(target_name = name, "target already gone");
            }
            Err(error) => return Err(error),
        }

        let mountpoint = spec.mountpoint(&self.config.mount_root);
        retry_with_backoff(retry, "detach loops", transient, || {
            self.services.loops.detach(&mountpoint)
        })?;

        if self.services.clones.exists(spec)? {
            self.services.clones.destroy(spec)?;
        }
        Ok(())
    }

    /// Every differential-rollback restore on record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store cannot be read.
    pub fn list(&self) -> Result<Vec<RestoreRecord>> {
        Ok(self
            .services
            .records
            .list()?
            .into_iter()
            .filter(|record| record.restore_type == RESTORE_TYPE)
            .collect())
    }

    /// Tear down clones left behind by provisioning runs that never wrote
    /// their record.
    ///
    /// # Errors
    ///
    /// Returns an error only if clones or records cannot be listed; failures
    /// on individual orphans are collected in the report.
    pub fn sweep_orphans(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for spec in self.services.clones.list_all()? {
            if spec.suffix() != RESTORE_TYPE.suffix() || spec.pool() != self.config.pool {
                continue;
            }
            let key = Self::key(spec.asset(), spec.snapshot());
            if self.services.records.find(&key)?.is_some() {
                continue;
            }
            let Some(_lock) = ProvisionLock::try_acquire(&self.config.lock_dir, &key)? else {
                debug!(clone = %spec, "orphan is locked, skipping");
                report.in_progress.push(spec);
                continue;
            };

            let name = target_name(&self.config.iqn_prefix, &spec);
            match self.teardown(&spec, &name) {
                Ok(()) => {
                    info!(clone = %spec, "removed orphaned clone");
                    report.removed.push(spec);
                }
                Err(error) => {
                    warn!(clone = %spec, "failed to remove orphaned clone: {error}");
                    report.failed.push(SweepFailure {
                        clone: spec.dataset(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }
}
