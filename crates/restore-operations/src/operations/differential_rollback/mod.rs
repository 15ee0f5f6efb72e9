mod context;
mod service;
pub mod stages;

pub use context::{RestoreContext, RestoreRequest};
pub use service::{
    DifferentialRollbackService, ProvisionedRestore, RestoreServices, SweepFailure, SweepReport,
};
