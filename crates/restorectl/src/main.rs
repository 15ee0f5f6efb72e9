mod commands;
mod error;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use restore_operations::config::{DEFAULT_CONFIG_PATH, RestoreConfig};
use restore_operations::operations::{DifferentialRollbackService, RestoreServices};

use crate::commands::Commands;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "restorectl")]
#[command(about = "Provision and tear down differential-rollback restore targets", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log progress at info level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RESTORECTL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    signal::install_handler();

    let config = match RestoreConfig::load(&cli.config) {
        Ok(config) => config,
        Err(source) => {
            print_error(&CliError::Config {
                path: cli.config,
                source,
            });
            return ExitCode::FAILURE;
        }
    };
    let service = DifferentialRollbackService::new(RestoreServices::system(&config), config);

    match cli.command.execute(&service) {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }

    if let CliError::Operation(operation) = error {
        for failure in operation.teardown_failures() {
            eprintln!(
                "teardown failed: {} ({}): {}",
                failure.stage, failure.phase, failure.error
            );
        }
    }
}
