use std::process::ExitCode;

use restore_operations::operations::DifferentialRollbackService;

use super::RestoreArgs;
use crate::error::Result;

pub(crate) fn run(service: &DifferentialRollbackService, args: &RestoreArgs) -> Result<ExitCode> {
    let label = format!("{}@{} ({})", args.asset, args.snapshot, args.suffix);
    if service.restore_exists(&args.asset, args.snapshot, &args.suffix)? {
        println!("{label} exists");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{label} does not exist");
        Ok(ExitCode::FAILURE)
    }
}
