// ABOUTME: Application-wide error types for berth.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::pipeline::{IllegalTransition, StageKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline failed at stage '{stage}': {message}")]
    PipelineFailed {
        stage: StageKind,
        message: String,
        exit_code: i32,
    },

    #[error("internal error: {0}")]
    Internal(#[from] IllegalTransition),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigNotFound(_)
            | Error::UnknownDestination(_)
            | Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::Yaml(_) => 2,
            Error::PipelineFailed { exit_code, .. } => *exit_code,
            Error::AlreadyExists(_) | Error::Io(_) | Error::Internal(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_2() {
        assert_eq!(Error::InvalidConfig("x".into()).exit_code(), 2);
        assert_eq!(Error::MissingEnvVar("X".into()).exit_code(), 2);
        assert_eq!(Error::ConfigNotFound(PathBuf::from(".")).exit_code(), 2);
    }

    #[test]
    fn pipeline_failure_carries_stage_code() {
        let err = Error::PipelineFailed {
            stage: StageKind::Build,
            message: "boom".into(),
            exit_code: 11,
        };
        assert_eq!(err.exit_code(), 11);
        assert_eq!(err.to_string(), "pipeline failed at stage 'build': boom");
    }
}
