// ABOUTME: Remote container lifecycle: lock, stop, remove, pull, launch.
// ABOUTME: Re-exports the manager, its report and the deploy lock.

mod error;
mod lock;
mod manager;

pub use error::{DeployError, DeployFailure, DeployFailureKind, DeployStep, Result};
pub use lock::{DeployLock, LockInfo};
pub use manager::{ContainerLifecycleManager, LaunchOptions, TransitionReport};
