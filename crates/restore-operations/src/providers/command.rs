use std::process::Command;

use tracing::debug;

use crate::Result;
use crate::error::OperationError;
use crate::traits::{CommandOutput, CommandRunner, command_line};

/// Runs programs with [`std::process::Command`], blocking until they exit.
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemCommandRunner {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(command = %command_line(program, args), "running command");

        let output = Command::new(program).args(args).output().map_err(|source| {
            OperationError::CommandSpawn {
                program: program.to_string(),
                source,
            }
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
