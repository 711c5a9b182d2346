// ABOUTME: Error types for remote container transitions.
// ABOUTME: Every failure names the step that failed and its cause.

use crate::exec::ExecError;
use crate::registry::{AuthError, RegistryError};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use std::fmt;

/// A step of the deploy sequence on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStep {
    DetectRuntime,
    AcquireLock,
    RegistryLogin,
    ListContainers,
    StopContainer(ContainerId),
    RemoveContainer(ContainerId),
    PullImage,
    LaunchContainer,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStep::DetectRuntime => write!(f, "detect runtime"),
            DeployStep::AcquireLock => write!(f, "acquire lock"),
            DeployStep::RegistryLogin => write!(f, "registry login"),
            DeployStep::ListContainers => write!(f, "list containers"),
            DeployStep::StopContainer(id) => write!(f, "stop {}", id.short()),
            DeployStep::RemoveContainer(id) => write!(f, "remove {}", id.short()),
            DeployStep::PullImage => write!(f, "pull"),
            DeployStep::LaunchContainer => write!(f, "launch"),
        }
    }
}

/// Why a deploy step failed.
#[derive(Debug, thiserror::Error)]
pub enum DeployFailure {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("exit code {exit_code}: {stderr}")]
    CommandFailed { exit_code: u32, stderr: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock could not be acquired: {0}")]
    Lock(String),

    #[error("no container runtime found on target (checked docker and podman)")]
    NoRuntime,
}

/// Coarse classification of a deploy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployFailureKind {
    SessionLost,
    Exec,
    CommandFailed,
    PermissionDenied,
    Registry,
    Auth,
    Lock,
    NoRuntime,
}

/// A failed deploy step. Steps already completed are not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("deploy step '{step}' failed: {cause}")]
pub struct DeployError {
    pub step: DeployStep,
    #[source]
    pub cause: DeployFailure,
}

impl DeployError {
    pub fn new(step: DeployStep, cause: impl Into<DeployFailure>) -> Self {
        Self {
            step,
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> DeployFailureKind {
        match &self.cause {
            DeployFailure::Exec(e) if e.is_session_lost() => DeployFailureKind::SessionLost,
            DeployFailure::Exec(_) => DeployFailureKind::Exec,
            DeployFailure::CommandFailed { .. } => DeployFailureKind::CommandFailed,
            DeployFailure::PermissionDenied(_) => DeployFailureKind::PermissionDenied,
            DeployFailure::Registry(RegistryError::Exec { source, .. })
                if source.is_session_lost() =>
            {
                DeployFailureKind::SessionLost
            }
            DeployFailure::Registry(_) => DeployFailureKind::Registry,
            DeployFailure::Auth(_) => DeployFailureKind::Auth,
            DeployFailure::LockHeld { .. } | DeployFailure::Lock(_) => DeployFailureKind::Lock,
            DeployFailure::NoRuntime => DeployFailureKind::NoRuntime,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_step_and_cause() {
        let err = DeployError::new(
            DeployStep::StopContainer(ContainerId::new("0123456789abcdef0123")),
            DeployFailure::PermissionDenied("got permission denied".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "deploy step 'stop 0123456789ab' failed: permission denied: got permission denied"
        );
        assert_eq!(err.kind(), DeployFailureKind::PermissionDenied);
    }

    #[test]
    fn session_loss_is_classified() {
        let err = DeployError::new(
            DeployStep::ListContainers,
            ExecError::SessionLost("channel closed".to_string()),
        );
        assert_eq!(err.kind(), DeployFailureKind::SessionLost);
    }
}
