use std::path::PathBuf;

use restore_core::{AssetKey, RestoreKey};
use restore_transaction::{LifecycleFailure, LifecyclePhase, TransactionError};
use thiserror::Error;

/// A rollback or cleanup that failed while a pipeline unwound.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Name of the stage whose teardown failed.
    pub stage: String,
    pub phase: LifecyclePhase,
    pub error: Box<OperationError>,
}

impl From<LifecycleFailure<OperationError>> for TeardownFailure {
    fn from(failure: LifecycleFailure<OperationError>) -> Self {
        Self {
            stage: failure.stage,
            phase: failure.phase,
            error: Box::new(failure.error),
        }
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Core(#[from] restore_core::CoreError),

    #[error("a restore for {0} already exists")]
    RestoreAlreadyExists(RestoreKey),

    #[error("no restore found for {0}")]
    RestoreNotFound(RestoreKey),

    #[error("restore {0} is locked by another process")]
    RestoreLocked(RestoreKey),

    #[error("restore record for {0} does not name a target")]
    MissingTargetOption(RestoreKey),

    #[error("asset '{0}' is encrypted; a passphrase is required")]
    PassphraseRequired(AssetKey),

    #[error("incorrect passphrase for asset '{0}'")]
    InvalidPassphrase(AssetKey),

    #[error("key file of asset '{asset}' has an invalid '{field}'")]
    KeyFileCorrupt { asset: AssetKey, field: &'static str },

    #[error("asset '{0}' is sealed")]
    AssetSealed(AssetKey),

    #[error("clone '{0}' already exists")]
    CloneAlreadyExists(String),

    #[error("target '{0}' not found")]
    TargetNotFound(String),

    #[error("no backing images found under '{0}'")]
    NoBackingImages(PathBuf),

    #[error("failed to run '{program}'")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}: {stderr}", exit_description(*code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output from '{command}': {reason}")]
    CommandOutput { command: String, reason: String },

    #[error("failed to detach {count} loop device(s) under '{mountpoint}'")]
    DetachFailed {
        mountpoint: PathBuf,
        count: usize,
        #[source]
        first: Box<OperationError>,
    },

    #[error("loop device '{0}' is attached without its decrypting mapping")]
    UnmappedLoopDevice(PathBuf),

    #[error("failed to parse loop device listing")]
    LoopListParse(#[source] serde_json::Error),

    #[error("invalid hide pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to move '{path}'")]
    FileMove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{path}'")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}'")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}'")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize '{path}'")]
    TomlSerialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("failed to lock '{path}'")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("restore pipeline failed at stage '{stage}'")]
    PipelineFailed {
        stage: String,
        #[source]
        source: Box<OperationError>,
    },

    #[error(
        "restore pipeline failed at stage '{stage}' and {} teardown step(s) also failed", teardown_failures.len()
    )]
    PipelineTeardownFailed {
        stage: String,
        #[source]
        source: Box<OperationError>,
        teardown_failures: Vec<TeardownFailure>,
    },

    #[error("restore pipeline cancelled before stage '{before_stage}'")]
    PipelineCancelled {
        before_stage: String,
        teardown_failures: Vec<TeardownFailure>,
    },

    #[error("{phase} failed for {} nested stage(s)", failures.len())]
    NestedTeardownFailed {
        phase: LifecyclePhase,
        failures: Vec<TeardownFailure>,
    },

    #[error("transaction failed: {0}")]
    Transaction(String),
}

pub type Result<T> = std::result::Result<T, OperationError>;

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

impl OperationError {
    #[must_use]
    pub fn is_target_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound(_))
    }

    /// Rollbacks and cleanups that failed while a pipeline unwound.
    #[must_use]
    pub fn teardown_failures(&self) -> &[TeardownFailure] {
        match self {
            Self::PipelineTeardownFailed {
                teardown_failures, ..
            }
            | Self::PipelineCancelled {
                teardown_failures, ..
            } => teardown_failures,
            Self::NestedTeardownFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<TransactionError<OperationError>> for OperationError {
    fn from(err: TransactionError<OperationError>) -> Self {
        match err {
            TransactionError::StageFailed {
                stage,
                source,
                rollback_failures,
                cleanup_failures,
            } => {
                let teardown_failures: Vec<TeardownFailure> = rollback_failures
                    .into_iter()
                    .chain(cleanup_failures)
                    .map(TeardownFailure::from)
                    .collect();
                if teardown_failures.is_empty() {
                    Self::PipelineFailed {
                        stage,
                        source: Box::new(source),
                    }
                } else {
                    Self::PipelineTeardownFailed {
                        stage,
                        source: Box::new(source),
                        teardown_failures,
                    }
                }
            }
            TransactionError::Cancelled {
                before_stage,
                rollback_failures,
                cleanup_failures,
            } => Self::PipelineCancelled {
                before_stage,
                teardown_failures: rollback_failures
                    .into_iter()
                    .chain(cleanup_failures)
                    .map(TeardownFailure::from)
                    .collect(),
            },
            TransactionError::TeardownFailed { phase, failures } => Self::NestedTeardownFailed {
                phase,
                failures: failures.into_iter().map(TeardownFailure::from).collect(),
            },
            other => Self::Transaction(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restore_core::RestoreType;

    fn key() -> RestoreKey {
        RestoreKey::new(
            AssetKey::new("A1").expect("valid asset"),
            1000,
            RestoreType::DifferentialRollback,
        )
    }

    #[test]
    fn already_exists_error_names_restore() {
        let err = OperationError::RestoreAlreadyExists(key());

        let msg = err.to_string();

        assert!(msg.contains("A1@1000"));
        assert!(msg.contains("differential-rollback"));
    }

    #[test]
    fn command_failed_without_status_mentions_signal() {
        let err = OperationError::CommandFailed {
            command: "zfs clone".to_string(),
            code: None,
            stderr: "killed".to_string(),
        };

        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn stage_failure_without_teardown_errors_keeps_source() {
        let err: OperationError = TransactionError::StageFailed {
            stage: "attach_loops".to_string(),
            source: OperationError::TargetNotFound("t".to_string()),
            rollback_failures: Vec::new(),
            cleanup_failures: Vec::new(),
        }
        .into();

        match err {
            OperationError::PipelineFailed { stage, source } => {
                assert_eq!(stage, "attach_loops");
                assert!(source.is_target_not_found());
            }
            other => panic!("expected PipelineFailed, got {other:?}"),
        }
    }

    #[test]
    fn stage_failure_with_teardown_errors_collects_both_phases() {
        let err: OperationError = TransactionError::StageFailed {
            stage: "publish_target".to_string(),
            source: OperationError::TargetNotFound("t".to_string()),
            rollback_failures: vec![LifecycleFailure {
                stage: "create_clone".to_string(),
                phase: LifecyclePhase::Rollback,
                error: OperationError::TargetNotFound("t".to_string()),
            }],
            cleanup_failures: vec![LifecycleFailure {
                stage: "hide_files".to_string(),
                phase: LifecyclePhase::Cleanup,
                error: OperationError::TargetNotFound("t".to_string()),
            }],
        }
        .into();

        assert!(err.to_string().contains("2 teardown step(s)"));
        let OperationError::PipelineTeardownFailed {
            teardown_failures, ..
        } = err
        else {
            panic!("expected PipelineTeardownFailed");
        };
        assert_eq!(teardown_failures[0].phase, LifecyclePhase::Rollback);
        assert_eq!(teardown_failures[1].stage, "hide_files");
    }
}
