use std::fmt::{self, Debug};

use thiserror::Error;

/// Which teardown phase a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Rollback,
    Cleanup,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rollback => write!(f, "rollback"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// A rollback or cleanup that failed for one stage.
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed for stage '{stage}'")]
pub struct LifecycleFailure<E> {
    /// Name of the stage whose teardown failed.
    pub stage: String,
    /// Whether this happened during rollback or cleanup.
    pub phase: LifecyclePhase,
    /// The underlying error.
    #[source]
    pub error: E,
}

/// A stage that failed under the continue-on-failure policy.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed")]
pub struct StageFailure<E> {
    /// Name of the stage that failed.
    pub stage: String,
    /// The error the stage returned from `commit`.
    #[source]
    pub error: E,
}

/// Terminal failure of a transaction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError<E: Debug> {
    /// A stage failed under stop-on-failure; everything committed was rolled back.
    #[error("stage '{stage}' failed{}", teardown_suffix(rollback_failures.len(), cleanup_failures.len()))]
    StageFailed {
        /// Name of the stage that failed.
        stage: String,
        /// The error that caused the stage to fail.
        #[source]
        source: E,
        /// Rollbacks that failed while unwinding.
        rollback_failures: Vec<LifecycleFailure<E>>,
        /// Cleanups that failed after unwinding.
        cleanup_failures: Vec<LifecycleFailure<E>>,
    },

    /// The cancellation check fired before a stage started.
    #[error("transaction cancelled before stage '{before_stage}'{}", teardown_suffix(rollback_failures.len(), cleanup_failures.len()))]
    Cancelled {
        /// The stage that would have run next.
        before_stage: String,
        /// Rollbacks that failed while unwinding.
        rollback_failures: Vec<LifecycleFailure<E>>,
        /// Cleanups that failed after unwinding.
        cleanup_failures: Vec<LifecycleFailure<E>>,
    },

    /// Teardown of a nested transaction left some stages behind.
    #[error("{phase} failed for {} stage(s)", failures.len())]
    TeardownFailed {
        /// The phase that failed.
        phase: LifecyclePhase,
        /// One entry per stage that failed.
        failures: Vec<LifecycleFailure<E>>,
    },
}

impl<E: Debug> TransactionError<E> {
    /// Rollback failures recorded while unwinding, if any.
    #[must_use]
    pub fn rollback_failures(&self) -> &[LifecycleFailure<E>] {
        match self {
            Self::StageFailed {
                rollback_failures, ..
            }
            | Self::Cancelled {
                rollback_failures, ..
            } => rollback_failures,
            Self::TeardownFailed { phase, failures } if *phase == LifecyclePhase::Rollback => {
                failures
            }
            Self::TeardownFailed { .. } => &[],
        }
    }

    /// Cleanup failures recorded after unwinding, if any.
    #[must_use]
    pub fn cleanup_failures(&self) -> &[LifecycleFailure<E>] {
        match self {
            Self::StageFailed {
                cleanup_failures, ..
            }
            | Self::Cancelled {
                cleanup_failures, ..
            } => cleanup_failures,
            Self::TeardownFailed { phase, failures } if *phase == LifecyclePhase::Cleanup => {
                failures
            }
            Self::TeardownFailed { .. } => &[],
        }
    }
}

fn teardown_suffix(rollbacks: usize, cleanups: usize) -> String {
    match (rollbacks, cleanups) {
        (0, 0) => String::new(),
        (r, 0) => format!(", and {r} rollback(s) also failed"),
        (0, c) => format!(", and {c} cleanup(s) also failed"),
        (r, c) => format!(", and {r} rollback(s) and {c} cleanup(s) also failed"),
    }
}
