use std::process::ExitCode;

use restore_operations::operations::DifferentialRollbackService;

use super::RestoreArgs;
use crate::error::Result;

pub(crate) fn run(service: &DifferentialRollbackService, args: &RestoreArgs) -> Result<ExitCode> {
    let target = service.get_restore_data(&args.asset, args.snapshot, &args.suffix)?;

    println!("target:   {}", target.name);
    println!("password: {}", target.password);
    for (index, lun) in target.luns.iter().enumerate() {
        println!("lun {index}:    {}", lun.display());
    }
    Ok(ExitCode::SUCCESS)
}
