// ABOUTME: Local process execution for test commands and the build backend.
// ABOUTME: Spawns with tokio, feeds stdin secrets, and kills children on timeout.

use super::error::{ExecError, Result};
use super::{CommandLine, CommandOutput, CommandRunner};
use crate::deadline::TimeoutError;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    working_dir: Option<PathBuf>,
    command_timeout: Duration,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            working_dir: None,
            command_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn run_inner(&self, command: &CommandLine<'_>) -> Result<CommandOutput> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(if command.stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: command.program().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(secret) = command.stdin()
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(secret.secret().expose_secret().as_bytes())
                .await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;

        // u32::MAX when terminated by a signal
        let exit_code = output
            .status
            .code()
            .map(|c| c as u32)
            .unwrap_or(u32::MAX);

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &CommandLine<'_>) -> Result<CommandOutput> {
        tracing::debug!(command = %command, "running local command");
        match tokio::time::timeout(self.command_timeout, self.run_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(TimeoutError {
                operation: format!("`{}`", command.program()),
                limit: self.command_timeout,
            })),
        }
    }
}
