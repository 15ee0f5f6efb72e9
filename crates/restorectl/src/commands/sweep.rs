use std::process::ExitCode;

use restore_operations::operations::{DifferentialRollbackService, SweepReport};

use crate::error::{CliError, Result};

pub(crate) fn run(service: &DifferentialRollbackService) -> Result<ExitCode> {
    let report = service.sweep_orphans()?;
    print_report(&report);

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(CliError::SweepIncomplete(report.failed.len()))
    }
}

fn print_report(report: &SweepReport) {
    if report.removed.is_empty() && report.in_progress.is_empty() && report.failed.is_empty() {
        println!("No orphaned clones.");
        return;
    }
    for spec in &report.removed {
        println!("Removed orphaned clone {spec}");
    }
    for spec in &report.in_progress {
        println!("Skipped {spec}: provisioning in progress");
    }
    for failure in &report.failed {
        eprintln!("Failed to remove {}: {}", failure.clone, failure.error);
    }
}
