// ABOUTME: SSH connection error types.
// ABOUTME: Covers connection, host key verification and authentication failures.

use crate::deadline::TimeoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("host key for {host}:{port} rejected by {policy} host key policy")]
    HostKeyRejected {
        host: String,
        port: u16,
        policy: super::HostKeyPolicy,
    },

    #[error("authentication failed for user {user}: no valid credentials")]
    AuthenticationFailed { user: String },

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    /// Key material could not be decoded. Names the credential label only.
    #[error("failed to decode SSH key from credential '{label}'")]
    KeyDecode { label: String },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, ConnectError>;
