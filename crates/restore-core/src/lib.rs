pub mod error;
mod naming;
pub mod types;

pub use error::*;
pub use naming::{CloneSpec, target_name};
pub use types::*;
