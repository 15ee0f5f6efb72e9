mod error;
pub mod config;
pub mod lock;
pub mod operations;
pub mod providers;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub mod mocks;

pub use error::{OperationError, Result, TeardownFailure};
