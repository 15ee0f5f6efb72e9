use crate::Result;
use crate::error::OperationError;

/// Captured result of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs on behalf of the OS-backed providers.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and captures its output, whatever its exit
    /// status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Runs `program` and returns its stdout, treating a non-zero exit as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::CommandFailed`] if the program exits
    /// unsuccessfully.
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.execute(program, args)?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(OperationError::CommandFailed {
                command: command_line(program, args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
