use std::sync::Arc;

use chrono::Utc;
use restore_core::{RestoreRecord, TARGET_OPTION, TargetInfo};
use restore_transaction::Stage;
use tracing::{debug, info};

use super::context::RestoreContext;
use crate::error::OperationError;
use crate::retry::{RetryPolicy, retry_with_backoff, transient};
use crate::traits::{
    CloneManager, EncryptionService, FileExclusion, LoopManager, PasswordGenerator,
    RestoreRepository, TargetService,
};

type StageResult = Result<(), OperationError>;

/// Makes the asset key available to the loop manager.
pub struct UnsealStage {
    encryption: Arc<dyn EncryptionService>,
}

impl UnsealStage {
    #[must_use]
    pub fn new(encryption: Arc<dyn EncryptionService>) -> Self {
        Self { encryption }
    }
}

impl Stage for UnsealStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "unseal"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        let passphrase = ctx
            .passphrase()
            .ok_or_else(|| OperationError::PassphraseRequired(ctx.asset().clone()))?;
        self.encryption.unseal(ctx.asset(), passphrase)?;
        ctx.unsealed = true;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut RestoreContext) -> StageResult {
        if ctx.unsealed {
            self.encryption.seal(ctx.asset())?;
            ctx.unsealed = false;
            debug!(asset = %ctx.asset(), "resealed asset");
        }
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "seal the asset key again".to_string()
    }
}

pub struct CreateCloneStage {
    clones: Arc<dyn CloneManager>,
}

impl CreateCloneStage {
    #[must_use]
    pub fn new(clones: Arc<dyn CloneManager>) -> Self {
        Self { clones }
    }
}

impl Stage for CreateCloneStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "create_clone"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        // A leftover clone may belong to a concurrent or crashed run.
        if self.clones.exists(ctx.spec())? {
            return Err(OperationError::CloneAlreadyExists(ctx.spec().dataset()));
        }
        self.clones.create(ctx.spec())?;
        ctx.clone_created = true;
        info!(clone = %ctx.spec(), "created clone");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut RestoreContext) -> StageResult {
        if ctx.clone_created {
            self.clones.destroy(ctx.spec())?;
            ctx.clone_created = false;
            info!(clone = %ctx.spec(), "destroyed clone");
        }
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "destroy the clone created by this run".to_string()
    }
}

pub struct HideFilesStage {
    exclusion: Arc<dyn FileExclusion>,
    patterns: Vec<String>,
}

impl HideFilesStage {
    #[must_use]
    pub fn new(exclusion: Arc<dyn FileExclusion>, patterns: Vec<String>) -> Self {
        Self {
            exclusion,
            patterns,
        }
    }
}

impl Stage for HideFilesStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "hide_files"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        ctx.hidden_files = self.exclusion.hide(ctx.mountpoint(), &self.patterns)?;
        debug!(count = ctx.hidden_files.len(), "hid auxiliary files");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut RestoreContext) -> StageResult {
        if !ctx.hidden_files.is_empty() {
            self.exclusion.reveal(ctx.mountpoint(), &ctx.hidden_files)?;
            ctx.hidden_files.clear();
        }
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "move hidden files back into the clone".to_string()
    }
}

pub struct AttachLoopsStage {
    loops: Arc<dyn LoopManager>,
    retry: RetryPolicy,
}

impl AttachLoopsStage {
    #[must_use]
    pub fn new(loops: Arc<dyn LoopManager>, retry: RetryPolicy) -> Self {
        Self { loops, retry }
    }
}

impl Stage for AttachLoopsStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "attach_loops"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        ctx.loops = self
            .loops
            .attach(ctx.asset(), ctx.mountpoint(), ctx.encrypted)?;
        info!(count = ctx.loops.len(), "attached loop devices");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut RestoreContext) -> StageResult {
        // Detach scans the mountpoint, which also catches devices attached
        // before a partial failure.
        retry_with_backoff(&self.retry, "detach loops", transient, || {
            self.loops.detach(ctx.mountpoint())
        })?;
        ctx.loops.clear();
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "detach every loop device backed by the clone".to_string()
    }
}

pub struct PublishTargetStage {
    targets: Arc<dyn TargetService>,
    passwords: Arc<dyn PasswordGenerator>,
    retry: RetryPolicy,
}

impl PublishTargetStage {
    #[must_use]
    pub fn new(
        targets: Arc<dyn TargetService>,
        passwords: Arc<dyn PasswordGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            targets,
            passwords,
            retry,
        }
    }
}

impl Stage for PublishTargetStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "publish_target"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        self.targets.start_if_dead()?;
        let password = self.passwords.generate();
        let luns = ctx.lun_paths();
        self.targets
            .create_target(ctx.target_name(), &luns, &password)?;
        ctx.target = Some(TargetInfo {
            name: ctx.target_name().to_string(),
            password,
            luns,
        });
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut RestoreContext) -> StageResult {
        let name = ctx.target_name().to_string();
        match retry_with_backoff(&self.retry, "delete target", transient, || {
            self.targets.delete_target(&name)
        }) {
            Ok(()) => {}
            Err(error) if error.is_target_not_found() => {
                debug!(target_name = %name, "target already gone");
            }
            Err(error) => return Err(error),
        }
        ctx.target = None;
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "delete the published target".to_string()
    }
}

pub struct PersistRecordStage {
    records: Arc<dyn RestoreRepository>,
}

impl PersistRecordStage {
    #[must_use]
    pub fn new(records: Arc<dyn RestoreRepository>) -> Self {
        Self { records }
    }
}

impl Stage for PersistRecordStage {
    type Context = RestoreContext;
    type Error = OperationError;

    fn name(&self) -> &'static str {
        "persist_record"
    }

    fn commit(&mut self, ctx: &mut RestoreContext) -> StageResult {
        let record = RestoreRecord::new(ctx.key().clone(), Utc::now().to_rfc3339())
            .with_option(TARGET_OPTION, ctx.target_name());
        self.records.save(&record)?;
        ctx.record = Some(record);
        Ok(())
    }

    fn rollback_description(&self) -> String {
        "nothing; the record is written last".to_string()
    }
}
