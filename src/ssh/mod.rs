// ABOUTME: SSH client module for remote deployment targets.
// ABOUTME: Supports key credentials, SSH agent, and known_hosts verification policies.

mod client;
mod connector;
mod error;
mod host_key;

pub use client::{Session, SessionConfig};
pub use connector::{Connector, SshConnector};
pub use error::{ConnectError, Result};
pub use host_key::HostKeyPolicy;
