//! Transactional stage orchestration.
//!
//! A [`Transaction`] executes an ordered list of [`Stage`]s against a shared,
//! strongly typed context. Every stage that commits is remembered; when a
//! stage fails the [`FailureType`] decides whether everything committed so
//! far is rolled back (most recent first) or only the failing stage is undone
//! and execution continues. Cleanup runs over every committed stage once the
//! transaction finishes, whatever the outcome.
//!
//! Teardown never stops at the first broken stage: rollback and cleanup
//! failures are logged and handed back as [`LifecycleFailure`] lists so the
//! caller can inspect partial teardown.

mod audit;
mod error;
mod failure;
mod nested;
mod stage;
mod transaction;

pub use audit::{StageRecord, StageStatus, TransactionAuditLog};
pub use error::{LifecycleFailure, LifecyclePhase, StageFailure, TransactionError};
pub use failure::FailureType;
pub use nested::NestedTransaction;
pub use stage::Stage;
pub use transaction::{CommitReport, Transaction};
