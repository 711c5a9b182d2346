// ABOUTME: Container CLI detection on remote deployment targets.
// ABOUTME: Checks for docker first, then podman, unless explicitly configured.

use super::types::RuntimeType;
use crate::exec::{CommandLine, CommandRunner, ExecError};

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found on target (checked docker and podman)")]
    NoRuntimeFound,

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Determine which container CLI to use on the target.
///
/// An explicit `configured` runtime is trusted without probing. Otherwise
/// `docker` is preferred over `podman`.
pub async fn detect_runtime<R: CommandRunner + ?Sized>(
    runner: &R,
    configured: Option<RuntimeType>,
) -> Result<RuntimeType, DetectionError> {
    if let Some(runtime) = configured {
        return Ok(runtime);
    }

    for candidate in [RuntimeType::Docker, RuntimeType::Podman] {
        let lookup = CommandLine::new("command")
            .arg("-v")
            .arg(candidate.binary());
        let output = runner.run(&lookup).await?;
        if output.success() && !output.stdout.trim().is_empty() {
            tracing::debug!(runtime = %candidate, path = output.stdout.trim(), "detected runtime");
            return Ok(candidate);
        }
    }

    Err(DetectionError::NoRuntimeFound)
}
