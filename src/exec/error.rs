// ABOUTME: Command execution error types.
// ABOUTME: Shared by local processes and remote SSH sessions.

use crate::deadline::TimeoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// The transport dropped; nothing more can run on this session.
    #[error("session lost: {0}")]
    SessionLost(String),

    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: u32,
        stderr: String,
    },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, ExecError::SessionLost(_))
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
