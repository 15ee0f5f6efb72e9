use std::fmt::{Debug, Display};

use tracing::debug;

use crate::error::{LifecyclePhase, TransactionError};
use crate::failure::FailureType;
use crate::stage::Stage;
use crate::transaction::Transaction;

/// A transaction that is itself a stage of an enclosing transaction.
///
/// The inner transaction cleans up after its own commit and rolls itself back
/// when one of its stages fails, so the enclosing transaction would otherwise
/// repeat that work during its own teardown pass. Each lifecycle method
/// therefore runs at most once.
pub struct NestedTransaction<C, E> {
    name: &'static str,
    inner: Transaction<C, E>,
    commit_occurred: bool,
    cleanup_occurred: bool,
    rollback_occurred: bool,
}

impl<C, E> NestedTransaction<C, E> {
    #[must_use]
    pub fn new(name: &'static str, failure_type: FailureType) -> Self {
        Self::from_transaction(name, Transaction::new(failure_type))
    }

    #[must_use]
    pub fn from_transaction(name: &'static str, inner: Transaction<C, E>) -> Self {
        Self {
            name,
            inner,
            commit_occurred: false,
            cleanup_occurred: false,
            rollback_occurred: false,
        }
    }

    /// Append a stage to the inner transaction.
    pub fn add<S>(&mut self, stage: S) -> &mut Self
    where
        S: Stage<Context = C, Error = E> + 'static,
    {
        self.inner.add(stage);
        self
    }

    #[must_use]
    pub fn inner(&self) -> &Transaction<C, E> {
        &self.inner
    }

    #[must_use]
    pub fn commit_occurred(&self) -> bool {
        self.commit_occurred
    }

    #[must_use]
    pub fn cleanup_occurred(&self) -> bool {
        self.cleanup_occurred
    }

    #[must_use]
    pub fn rollback_occurred(&self) -> bool {
        self.rollback_occurred
    }
}

impl<C, E> Stage for NestedTransaction<C, E>
where
    E: Debug + Display + From<TransactionError<E>>,
{
    type Context = C;
    type Error = E;

    fn name(&self) -> &'static str {
        self.name
    }

    fn commit(&mut self, ctx: &mut C) -> Result<(), E> {
        if self.commit_occurred {
            debug!(stage = self.name, "nested commit already ran");
            return Ok(());
        }
        self.commit_occurred = true;

        let result = self.inner.commit(ctx);
        // The inner commit always runs its own cleanup pass.
        self.cleanup_occurred = true;

        match result {
            Ok(_report) => Ok(()),
            Err(error) => {
                // Stop-on-failure and cancellation both unwind the inner stages.
                self.rollback_occurred = true;
                Err(E::from(error))
            }
        }
    }

    fn cleanup(&mut self, ctx: &mut C) -> Result<(), E> {
        if self.cleanup_occurred {
            return Ok(());
        }
        self.cleanup_occurred = true;

        let failures = self.inner.cleanup(ctx);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(E::from(TransactionError::TeardownFailed {
                phase: LifecyclePhase::Cleanup,
                failures,
            }))
        }
    }

    fn rollback(&mut self, ctx: &mut C) -> Result<(), E> {
        if self.rollback_occurred {
            return Ok(());
        }
        self.rollback_occurred = true;

        let failures = self.inner.rollback(ctx);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(E::from(TransactionError::TeardownFailed {
                phase: LifecyclePhase::Rollback,
                failures,
            }))
        }
    }

    fn rollback_description(&self) -> String {
        format!("roll back nested transaction '{}'", self.name)
    }
}
