//! Command Runner
//!
//! Runs commands in order over one open session and keeps the first
//! output line of each. Closing the session is the caller's job.

use tracing::{debug, warn};

use crate::domain::CommandResult;
use crate::error::{FleetError, Result};
use crate::ports::SshSessionTrait;
use crate::ssh::CommandOutput;

#[derive(Debug, Clone, Copy)]
pub struct CommandRunner {
    check_exit_status: bool,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CommandRunner {
    #[must_use]
    pub const fn new(check_exit_status: bool) -> Self {
        Self { check_exit_status }
    }

    /// Execute `commands` strictly in order, stopping at the first failure
    ///
    /// Each command is an independent remote exec and is never retried.
    /// Anything after the first output line is discarded.
    ///
    /// # Errors
    ///
    /// - `EmptyOutput` if a command writes nothing to stdout
    /// - `CommandFailed` if a command exits non-zero and exit status
    ///   checking is enabled
    /// - `CommandAborted` if a command is killed by a signal or reports
    ///   no exit status, with checking enabled
    /// - any error from the session's `exec`
    pub async fn run<S>(&self, session: &S, commands: &[String]) -> Result<Vec<CommandResult>>
    where
        S: SshSessionTrait + ?Sized,
    {
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            let output = session.exec(command).await?;

            debug!(
                host = %session.host_name(),
                command = %command,
                exit_code = ?output.exit_code,
                exit_signal = ?output.exit_signal,
                duration_ms = output.duration_ms,
                "Command finished"
            );

            if self.check_exit_status {
                Self::check_exit(session.host_name(), command, &output)?;
            }

            let Some(first_line) = output.stdout.lines().next() else {
                return Err(FleetError::EmptyOutput {
                    host: session.host_name().to_string(),
                    command: command.clone(),
                });
            };

            if !output.exited_cleanly() {
                warn!(
                    host = %session.host_name(),
                    command = %command,
                    exit_code = ?output.exit_code,
                    exit_signal = ?output.exit_signal,
                    "Command did not exit cleanly"
                );
            }

            results.push(CommandResult {
                command: command.clone(),
                first_line: first_line.to_string(),
                exit_code: output.exit_code,
            });
        }

        Ok(results)
    }

    /// A signal or a missing status is a failure, like a non-zero status
    fn check_exit(host: &str, command: &str, output: &CommandOutput) -> Result<()> {
        match (output.exit_code, output.exit_signal.as_deref()) {
            (Some(0), None) => Ok(()),
            (_, Some(signal)) => Err(FleetError::CommandAborted {
                host: host.to_string(),
                command: command.to_string(),
                reason: format!("killed by signal {signal}"),
            }),
            (Some(exit_code), None) => Err(FleetError::CommandFailed {
                host: host.to_string(),
                command: command.to_string(),
                exit_code,
            }),
            (None, None) => Err(FleetError::CommandAborted {
                host: host.to_string(),
                command: command.to_string(),
                reason: "no exit status reported".to_string(),
            }),
        }
    }
}
