// ABOUTME: Container CLI selection for Docker and Podman.
// ABOUTME: Auto-detects the remote CLI or uses explicit config.

mod detection;
mod types;

pub use detection::{DetectionError, detect_runtime};
pub use types::RuntimeType;
