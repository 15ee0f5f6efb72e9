mod differential_rollback;

pub use differential_rollback::{
    DifferentialRollbackService, ProvisionedRestore, RestoreContext, RestoreRequest,
    RestoreServices, SweepFailure, SweepReport, stages,
};
