// ABOUTME: Connector seam between the deploy stage and the SSH transport.
// ABOUTME: SshConnector opens real sessions; tests substitute in-memory hosts.

use super::client::Session;
use super::error::{ConnectError, Result};
use crate::config::RemoteTarget;
use crate::credential::Credential;
use crate::exec::CommandRunner;
use async_trait::async_trait;
use std::time::Duration;

/// Opens and closes sessions to a remote target.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: CommandRunner + 'static;

    async fn connect(
        &self,
        target: &RemoteTarget,
        key: Option<&Credential>,
    ) -> Result<Self::Session>;

    async fn disconnect(&self, session: Self::Session) -> Result<()>;
}

/// Connects over SSH using russh.
#[derive(Debug, Clone)]
pub struct SshConnector {
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = Session;

    async fn connect(&self, target: &RemoteTarget, key: Option<&Credential>) -> Result<Session> {
        let config = target
            .session_config()
            .command_timeout(self.command_timeout);
        tracing::info!(host = %target.host, port = target.port, "connecting");
        Session::connect(config, key).await
    }

    async fn disconnect(&self, session: Session) -> std::result::Result<(), ConnectError> {
        session.disconnect().await
    }
}
