// ABOUTME: Command abstraction shared by local and remote execution.
// ABOUTME: Defines CommandLine, CommandOutput, the CommandRunner trait and sequencing.

mod error;
mod local;

pub use error::{ExecError, Result};
pub use local::LocalRunner;

use crate::credential::Credential;
use async_trait::async_trait;
use std::fmt;

/// A program invocation with arguments and an optional secret fed on stdin.
///
/// Secrets never appear in the rendered command line.
#[derive(Debug, Clone)]
pub struct CommandLine<'a> {
    program: String,
    args: Vec<String>,
    stdin: Option<&'a Credential>,
}

impl<'a> CommandLine<'a> {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_secret(mut self, secret: &'a Credential) -> Self {
        self.stdin = Some(secret);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin(&self) -> Option<&'a Credential> {
        self.stdin
    }

    /// Render as a single POSIX shell command string.
    pub fn to_shell(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_shell())
    }
}

/// Quote a word for POSIX sh, leaving plain words untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
        });
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into `ExecError::CommandFailed`.
    pub fn ensure_success(self, command: &CommandLine<'_>) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Something that can run commands: a local shell or a remote session.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command and capture its exit status and output.
    ///
    /// A non-zero exit is not an error at this level; transport failures are.
    async fn run(&self, command: &CommandLine<'_>) -> Result<CommandOutput>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    async fn run(&self, command: &CommandLine<'_>) -> Result<CommandOutput> {
        (**self).run(command).await
    }
}

/// Run commands in order over one runner, stopping at the first failure.
///
/// A lost session or a non-zero exit aborts the remaining commands; nothing
/// after the failing command is sent.
pub async fn run_sequence<R: CommandRunner + ?Sized>(
    runner: &R,
    commands: &[CommandLine<'_>],
) -> Result<Vec<CommandOutput>> {
    let mut outputs = Vec::with_capacity(commands.len());

    for (index, command) in commands.iter().enumerate() {
        tracing::debug!(step = index, command = %command, "running command");
        let output = match runner.run(command).await {
            Ok(output) => output,
            Err(e) => {
                if e.is_session_lost() {
                    tracing::warn!(
                        step = index,
                        remaining = commands.len() - index - 1,
                        "session lost, aborting command sequence"
                    );
                }
                return Err(e);
            }
        };
        outputs.push(output.ensure_success(command)?);
    }

    Ok(outputs)
}
