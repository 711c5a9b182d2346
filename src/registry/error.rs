// ABOUTME: Registry error types for login, push and pull.
// ABOUTME: Credentials are referenced by label only, never by value.

use crate::exec::ExecError;
use crate::types::ImageReference;
use thiserror::Error;

/// Login failures. Fatal and never retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("registry rejected credential '{credential}' for user {username}: {detail}")]
    Rejected {
        credential: String,
        username: String,
        detail: String,
    },

    #[error("login with credential '{credential}' could not run: {source}")]
    Exec {
        credential: String,
        #[source]
        source: ExecError,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transient failures persisted past the retry budget.
    #[error("registry unavailable: {operation} {image} failed after {attempts} attempt(s): {last_error}")]
    Unavailable {
        operation: RegistryOperation,
        image: ImageReference,
        attempts: u32,
        last_error: String,
    },

    #[error("not authorized to {operation} {image}: {detail}")]
    Unauthorized {
        operation: RegistryOperation,
        image: ImageReference,
        detail: String,
    },

    #[error("image not found in registry: {image}")]
    NotFound { image: ImageReference },

    #[error("{operation} {image} failed with exit code {exit_code}: {detail}")]
    Failed {
        operation: RegistryOperation,
        image: ImageReference,
        exit_code: u32,
        detail: String,
    },

    #[error("{operation} {image} could not run: {source}")]
    Exec {
        operation: RegistryOperation,
        image: ImageReference,
        #[source]
        source: ExecError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOperation {
    Push,
    Pull,
}

impl std::fmt::Display for RegistryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryOperation::Push => write!(f, "push"),
            RegistryOperation::Pull => write!(f, "pull"),
        }
    }
}
