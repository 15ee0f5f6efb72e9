use std::process::ExitCode;

use restore_operations::operations::DifferentialRollbackService;

use crate::error::Result;

pub(crate) fn run(service: &DifferentialRollbackService) -> Result<ExitCode> {
    let records = service.list()?;
    if records.is_empty() {
        println!("No restores.");
        return Ok(ExitCode::SUCCESS);
    }

    for record in &records {
        println!(
            "{}  target={}  created={}",
            record.key(),
            record.target_name().unwrap_or("-"),
            record.created_at
        );
    }
    Ok(ExitCode::SUCCESS)
}
