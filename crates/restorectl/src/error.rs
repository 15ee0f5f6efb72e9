use std::path::PathBuf;

use restore_operations::OperationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration from '{path}'")]
    Config {
        path: PathBuf,
        #[source]
        source: OperationError,
    },

    #[error("restore operation failed")]
    Operation(#[from] OperationError),

    #[error("failed to read passphrase file '{path}'")]
    PassphraseFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("passphrase file '{0}' is empty")]
    EmptyPassphrase(PathBuf),

    #[error("{0} orphaned clone(s) could not be removed")]
    SweepIncomplete(usize),
}

pub type Result<T> = std::result::Result<T, CliError>;
