// ABOUTME: Stage error types with the SNAFU pattern.
// ABOUTME: Wraps every leaf failure a stage can produce for programmatic handling.

use snafu::Snafu;

use super::stage::{ArtifactKind, StageKind};
use crate::build::BuildError;
use crate::deadline::TimeoutError;
use crate::exec::ExecError;
use crate::lifecycle::{DeployError, DeployFailureKind};
use crate::registry::{AuthError, RegistryError};
use crate::ssh::ConnectError;

/// Stage wiring that cannot work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("stage '{stage}' requires {input} but no earlier stage produces it")]
    MissingInput { stage: StageKind, input: ArtifactKind },

    #[error("stage '{stage}' declares output {output} but did not publish it")]
    MissingOutput { stage: StageKind, output: ArtifactKind },

    #[error("stage '{stage}' cannot run after '{after}'")]
    OutOfOrder { stage: StageKind, after: StageKind },
}

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("test command `{command}` failed with exit code {exit_code}")]
    CommandFailed { command: String, exit_code: u32 },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// A stage failure.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StageError {
    #[snafu(display("configuration error: {source}"))]
    Configuration { source: ConfigurationError },

    #[snafu(display("tests failed: {source}"))]
    Test { source: TestError },

    #[snafu(display("build failed: {source}"))]
    Build { source: BuildError },

    #[snafu(display("registry authentication failed: {source}"))]
    Auth { source: AuthError },

    #[snafu(display("registry operation failed: {source}"))]
    Registry { source: RegistryError },

    #[snafu(display("connection failed: {source}"))]
    Connect { source: ConnectError },

    #[snafu(display("command execution failed: {source}"))]
    Exec { source: ExecError },

    #[snafu(display("{source}"))]
    Deploy { source: DeployError },

    #[snafu(display("{source}"))]
    Timeout { source: TimeoutError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    Configuration,
    Test,
    Build,
    Auth,
    Registry,
    Connect,
    SessionLost,
    Exec,
    Deploy,
    Timeout,
}

impl StageError {
    pub fn kind(&self) -> StageErrorKind {
        match self {
            StageError::Configuration { .. } => StageErrorKind::Configuration,
            StageError::Test { .. } => StageErrorKind::Test,
            StageError::Build { .. } => StageErrorKind::Build,
            StageError::Auth { .. } => StageErrorKind::Auth,
            StageError::Registry { .. } => StageErrorKind::Registry,
            StageError::Connect { .. } => StageErrorKind::Connect,
            StageError::Exec { source } if source.is_session_lost() => StageErrorKind::SessionLost,
            StageError::Exec { .. } => StageErrorKind::Exec,
            StageError::Deploy { source } if source.kind() == DeployFailureKind::SessionLost => {
                StageErrorKind::SessionLost
            }
            StageError::Deploy { .. } => StageErrorKind::Deploy,
            StageError::Timeout { .. } => StageErrorKind::Timeout,
        }
    }
}

impl From<ConfigurationError> for StageError {
    fn from(source: ConfigurationError) -> Self {
        StageError::Configuration { source }
    }
}

impl From<TestError> for StageError {
    fn from(source: TestError) -> Self {
        StageError::Test { source }
    }
}

impl From<BuildError> for StageError {
    fn from(source: BuildError) -> Self {
        StageError::Build { source }
    }
}

impl From<AuthError> for StageError {
    fn from(source: AuthError) -> Self {
        StageError::Auth { source }
    }
}

impl From<RegistryError> for StageError {
    fn from(source: RegistryError) -> Self {
        StageError::Registry { source }
    }
}

impl From<ConnectError> for StageError {
    fn from(source: ConnectError) -> Self {
        StageError::Connect { source }
    }
}

impl From<ExecError> for StageError {
    fn from(source: ExecError) -> Self {
        StageError::Exec { source }
    }
}

impl From<DeployError> for StageError {
    fn from(source: DeployError) -> Self {
        StageError::Deploy { source }
    }
}

impl From<TimeoutError> for StageError {
    fn from(source: TimeoutError) -> Self {
        StageError::Timeout { source }
    }
}
