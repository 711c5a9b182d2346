// ABOUTME: Container CLI definitions for Docker and Podman.
// ABOUTME: Includes the RuntimeType enum and the per-target override.

use serde::{Deserialize, Serialize};

/// The container CLI used to build, push, pull and run images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    #[default]
    Docker,
    Podman,
}

impl RuntimeType {
    /// Name of the executable on PATH.
    pub fn binary(&self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary())
    }
}
