use std::collections::VecDeque;
use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::TransactionAuditLog;
use crate::error::{LifecycleFailure, LifecyclePhase, StageFailure, TransactionError};
use crate::failure::FailureType;
use crate::stage::Stage;

type BoxedStage<C, E> = Box<dyn Stage<Context = C, Error = E>>;

struct CancelHook<C> {
    check: Box<dyn Fn() -> bool>,
    on_cancelled: Option<Box<dyn FnMut(&mut C)>>,
}

/// Outcome of a transaction that ran to the end of its stage list.
///
/// Under [`FailureType::ContinueOnFailure`] a successful commit may still
/// carry stage failures; callers must inspect them rather than assume
/// all-or-nothing semantics.
#[derive(Debug)]
pub struct CommitReport<E> {
    /// Names of committed stages, in commit order.
    pub committed: Vec<String>,
    /// Stages that failed and were rolled back individually.
    pub stage_failures: Vec<StageFailure<E>>,
    /// Rollbacks of failing stages that themselves failed.
    pub rollback_failures: Vec<LifecycleFailure<E>>,
    /// Cleanups that failed after the last stage.
    pub cleanup_failures: Vec<LifecycleFailure<E>>,
}

impl<E> CommitReport<E> {
    /// Whether every stage committed and every teardown succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stage_failures.is_empty()
            && self.rollback_failures.is_empty()
            && self.cleanup_failures.is_empty()
    }
}

/// An ordered sequence of stages executed with a shared context.
///
/// The order of [`add`](Self::add) calls is the commit order; committed
/// stages are rolled back in the reverse order.
pub struct Transaction<C, E> {
    stages: Vec<BoxedStage<C, E>>,
    committed: VecDeque<usize>,
    failure_type: FailureType,
    cancel_hook: Option<CancelHook<C>>,
    audit_log: TransactionAuditLog,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl<C, E> Transaction<C, E> {
    #[must_use]
    pub fn new(failure_type: FailureType) -> Self {
        Self {
            stages: Vec::new(),
            committed: VecDeque::new(),
            failure_type,
            cancel_hook: None,
            audit_log: TransactionAuditLog::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Append a stage.
    pub fn add<S>(&mut self, stage: S) -> &mut Self
    where
        S: Stage<Context = C, Error = E> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append `stage` only when `condition` holds.
    pub fn add_if<S>(&mut self, condition: bool, stage: S) -> &mut Self
    where
        S: Stage<Context = C, Error = E> + 'static,
    {
        if condition {
            self.add(stage);
        }
        self
    }

    /// Append `stage` when `condition` holds, `alt` otherwise.
    pub fn add_if_else<S, A>(&mut self, condition: bool, stage: S, alt: A) -> &mut Self
    where
        S: Stage<Context = C, Error = E> + 'static,
        A: Stage<Context = C, Error = E> + 'static,
    {
        if condition {
            self.add(stage)
        } else {
            self.add(alt)
        }
    }

    /// Check `check` before every stage commit and abort when it returns true.
    pub fn on_cancel<F>(&mut self, check: F) -> &mut Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel_hook = Some(CancelHook {
            check: Box::new(check),
            on_cancelled: None,
        });
        self
    }

    /// Like [`on_cancel`](Self::on_cancel), running `on_cancelled` before the
    /// transaction unwinds.
    pub fn on_cancel_with<F, G>(&mut self, check: F, on_cancelled: G) -> &mut Self
    where
        F: Fn() -> bool + 'static,
        G: FnMut(&mut C) + 'static,
    {
        self.cancel_hook = Some(CancelHook {
            check: Box::new(check),
            on_cancelled: Some(Box::new(on_cancelled)),
        });
        self
    }

    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        self.failure_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of all stages, in commit order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Names of committed stages, most recently committed first.
    #[must_use]
    pub fn committed_stages(&self) -> Vec<&'static str> {
        self.committed
            .iter()
            .map(|&index| self.stages[index].name())
            .collect()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn audit_log(&self) -> &TransactionAuditLog {
        &self.audit_log
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_hook.as_ref().is_some_and(|hook| (hook.check)())
    }
}

impl<C, E> Transaction<C, E>
where
    E: Debug + Display,
{
    /// Commit every stage in order.
    ///
    /// Cleanup runs over every committed stage before this returns, whether
    /// the transaction succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::StageFailed`] when a stage fails under
    /// stop-on-failure, after rolling back that stage and every committed
    /// stage. Returns [`TransactionError::Cancelled`] when the cancellation
    /// check fires, after rolling back every committed stage.
    pub fn commit(&mut self, ctx: &mut C) -> Result<CommitReport<E>, TransactionError<E>> {
        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.committed.clear();
        self.audit_log.clear();
        debug!(
            stages = self.stages.len(),
            policy = %self.failure_type,
            "committing transaction"
        );

        let mut stage_failures = Vec::new();
        let mut rollback_failures = Vec::new();

        for index in 0..self.stages.len() {
            let name = self.stages[index].name();

            if self.is_cancelled() {
                return Err(self.abort_cancelled(index, ctx));
            }

            self.audit_log.record_start(index, name);
            match self.stages[index].commit(ctx) {
                Ok(()) => {
                    let description = self.stages[index].rollback_description();
                    self.audit_log.record_committed(description);
                    self.committed.push_front(index);
                    info!(stage = name, "stage committed");
                }
                Err(error) => {
                    self.audit_log.record_failure();
                    warn!(stage = name, policy = %self.failure_type, "stage failed: {error}");
                    match self.failure_type {
                        FailureType::StopOnFailure => {
                            return Err(self.abort(index, error, ctx));
                        }
                        FailureType::ContinueOnFailure => {
                            rollback_failures.extend(self.rollback_stage(index, ctx));
                            stage_failures.push(StageFailure {
                                stage: name.to_string(),
                                error,
                            });
                        }
                    }
                }
            }
        }

        let cleanup_failures = self.cleanup(ctx);
        self.ended_at = Some(Utc::now());

        Ok(CommitReport {
            committed: self
                .committed
                .iter()
                .rev()
                .map(|&index| self.stages[index].name().to_string())
                .collect(),
            stage_failures,
            rollback_failures,
            cleanup_failures,
        })
    }

    /// Roll back every committed stage, most recent first.
    ///
    /// Failures are logged and returned; they never stop the remaining
    /// rollbacks.
    pub fn rollback(&mut self, ctx: &mut C) -> Vec<LifecycleFailure<E>> {
        let mut failures = Vec::new();
        for position in 0..self.committed.len() {
            let index = self.committed[position];
            failures.extend(self.rollback_stage(index, ctx));
        }
        failures
    }

    /// Clean up every committed stage, most recent first.
    ///
    /// Failures are logged and returned; they never stop the remaining
    /// cleanups.
    pub fn cleanup(&mut self, ctx: &mut C) -> Vec<LifecycleFailure<E>> {
        let mut failures = Vec::new();
        for position in 0..self.committed.len() {
            let index = self.committed[position];
            let stage = &mut self.stages[index];
            let name = stage.name();
            match stage.cleanup(ctx) {
                Ok(()) => debug!(stage = name, "stage cleaned up"),
                Err(error) => {
                    warn!(stage = name, "cleanup failed: {error}");
                    self.audit_log.record_cleanup_failed(index);
                    failures.push(LifecycleFailure {
                        stage: name.to_string(),
                        phase: LifecyclePhase::Cleanup,
                        error,
                    });
                }
            }
        }
        failures
    }

    fn rollback_stage(&mut self, index: usize, ctx: &mut C) -> Option<LifecycleFailure<E>> {
        let stage = &mut self.stages[index];
        let name = stage.name();
        match stage.rollback(ctx) {
            Ok(()) => {
                self.audit_log.record_rolled_back(index);
                debug!(stage = name, "stage rolled back");
                None
            }
            Err(error) => {
                self.audit_log.record_rollback_failed(index);
                warn!(stage = name, "rollback failed: {error}");
                Some(LifecycleFailure {
                    stage: name.to_string(),
                    phase: LifecyclePhase::Rollback,
                    error,
                })
            }
        }
    }

    fn abort(&mut self, index: usize, error: E, ctx: &mut C) -> TransactionError<E> {
        let mut rollback_failures: Vec<_> = self.rollback_stage(index, ctx).into_iter().collect();
        rollback_failures.extend(self.rollback(ctx));
        let cleanup_failures = self.cleanup(ctx);
        self.ended_at = Some(Utc::now());

        TransactionError::StageFailed {
            stage: self.stages[index].name().to_string(),
            source: error,
            rollback_failures,
            cleanup_failures,
        }
    }

    fn abort_cancelled(&mut self, index: usize, ctx: &mut C) -> TransactionError<E> {
        let before_stage = self.stages[index].name();
        warn!(before_stage, "transaction cancelled");

        if let Some(on_cancelled) = self
            .cancel_hook
            .as_mut()
            .and_then(|hook| hook.on_cancelled.as_mut())
        {
            on_cancelled(ctx);
        }

        let rollback_failures = self.rollback(ctx);
        let cleanup_failures = self.cleanup(ctx);
        self.ended_at = Some(Utc::now());

        TransactionError::Cancelled {
            before_stage: before_stage.to_string(),
            rollback_failures,
            cleanup_failures,
        }
    }
}
