use std::process::ExitCode;

use restore_operations::operations::DifferentialRollbackService;

use super::RestoreArgs;
use crate::error::Result;

pub(crate) fn run(service: &DifferentialRollbackService, args: &RestoreArgs) -> Result<ExitCode> {
    service.remove(&args.asset, args.snapshot, &args.suffix)?;
    println!("Removed {}@{}", args.asset, args.snapshot);
    Ok(ExitCode::SUCCESS)
}
