use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid asset key '{0}': only ASCII letters, digits, '.', '_' and '-' are allowed")]
    InvalidAssetKey(String),

    #[error("invalid clone suffix '{0}': only lowercase ASCII letters and digits are allowed")]
    InvalidSuffix(String),

    #[error("unknown restore type '{0}'")]
    UnknownRestoreType(String),

    #[error("'{0}' is not a clone dataset name")]
    InvalidCloneName(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
