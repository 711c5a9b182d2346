// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, host key policy, authentication, and command execution.

use super::HostKeyPolicy;
use super::error::{ConnectError, Result};
use crate::credential::Credential;
use crate::deadline::TimeoutError;
use crate::exec::{self, CommandLine, CommandOutput, CommandRunner, ExecError};
use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect, Sig};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UnixStream;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// How unknown or changed host keys are handled.
    pub host_key_policy: HostKeyPolicy,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Timeout for establishing the connection (default: 30 seconds).
    pub connect_timeout: Duration,
    /// Timeout for command execution (default: 5 minutes).
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    fn learn(&self, server_public_key: &ssh_key::PublicKey) {
        let learn_result = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => learn_known_hosts(&self.host, self.port, server_public_key),
        };
        if let Err(e) = learn_result {
            tracing::warn!("Failed to save host key to known_hosts: {}", e);
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if self.policy == HostKeyPolicy::Skip {
            tracing::warn!(
                host = %self.host,
                port = self.port,
                "host key verification skipped; connection is open to impersonation"
            );
            return Ok(true);
        }

        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) if self.policy == HostKeyPolicy::AcceptNew => {
                tracing::warn!(
                    "Accepting new host key for {}:{} and saving to known_hosts",
                    self.host,
                    self.port
                );
                self.learn(server_public_key);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(russh::keys::Error::KeyChanged { line }) => {
                tracing::error!(
                    "Host key for {}:{} does not match known_hosts line {}",
                    self.host,
                    self.port,
                    line
                );
                Ok(false)
            }
            Err(e) => {
                // Unreadable known_hosts: treat the key as unknown
                tracing::debug!("known_hosts check failed: {}", e);
                if self.policy == HostKeyPolicy::AcceptNew {
                    self.learn(server_public_key);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Authentication method resolved from config.
enum AuthMethod {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// An established SSH session.
///
/// Dropping the session closes the underlying connection.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
    lost: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .field("lost", &self.lost.load(Ordering::Relaxed))
            .finish()
    }
}

impl Session {
    /// Connect to the remote host, authenticating with `key` when given.
    pub async fn connect(config: SessionConfig, key: Option<&Credential>) -> Result<Self> {
        let timeout = config.connect_timeout;
        match tokio::time::timeout(timeout, Self::connect_inner(config, key)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(TimeoutError {
                operation: "SSH connect".to_string(),
                limit: timeout,
            })),
        }
    }

    async fn connect_inner(config: SessionConfig, key: Option<&Credential>) -> Result<Self> {
        let auth_method = Self::resolve_auth_method(key).await?;

        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_key_policy,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => ConnectError::HostKeyRejected {
                host: config.host.clone(),
                port: config.port,
                policy: config.host_key_policy,
            },
            e if e.to_string().contains("Connection refused") => ConnectError::Connection(
                format!("connection refused to {}:{}", config.host, config.port),
            ),
            e => ConnectError::Connection(e.to_string()),
        })?;

        if !Self::authenticate(&mut handle, &config, auth_method).await? {
            return Err(ConnectError::AuthenticationFailed {
                user: config.user.clone(),
            });
        }

        tracing::debug!(host = %config.host, port = config.port, "SSH session established");

        Ok(Self {
            config,
            handle,
            lost: AtomicBool::new(false),
        })
    }

    /// Resolve which authentication method to use.
    async fn resolve_auth_method(key: Option<&Credential>) -> Result<AuthMethod> {
        // Key material from the credential handle wins
        if let Some(key) = key {
            let decoded =
                decode_secret_key(key.expose(), None).map_err(|_| ConnectError::KeyDecode {
                    label: key.label().to_string(),
                })?;
            return Ok(AuthMethod::KeyFile(Arc::new(decoded)));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(AuthMethod::Agent(agent));
        }

        // Fall back to default key locations
        let home = std::env::var("HOME").map_err(|_| {
            ConnectError::AgentUnavailable("SSH agent not available and HOME not set".to_string())
        })?;

        let default_keys = [
            format!("{}/.ssh/id_ed25519", home),
            format!("{}/.ssh/id_rsa", home),
            format!("{}/.ssh/id_ecdsa", home),
        ];

        for key_path in &default_keys {
            if let Ok(key) = load_secret_key(key_path, None) {
                return Ok(AuthMethod::KeyFile(Arc::new(key)));
            }
        }

        Err(ConnectError::AgentUnavailable(
            "SSH agent not available and no default keys found".to_string(),
        ))
    }

    /// Authenticate the session.
    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    ConnectError::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                if keys.is_empty() {
                    return Err(ConnectError::AgentUnavailable(
                        "no keys in SSH agent".to_string(),
                    ));
                }

                for key in &keys {
                    match handle
                        .authenticate_publickey_with(&config.user, key.clone(), None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();

                let result = handle
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;

                Ok(result.success())
            }
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether a transport failure has been observed on this session.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn mark_lost(&self, reason: String) -> ExecError {
        self.lost.store(true, Ordering::Release);
        tracing::warn!(host = %self.config.host, "SSH session lost: {}", reason);
        ExecError::SessionLost(reason)
    }

    /// Execute a command on the remote host.
    pub async fn exec(&self, command: &CommandLine<'_>) -> exec::Result<CommandOutput> {
        self.exec_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Execute a command with a custom timeout.
    pub async fn exec_with_timeout(
        &self,
        command: &CommandLine<'_>,
        timeout: Duration,
    ) -> exec::Result<CommandOutput> {
        if self.is_lost() {
            return Err(ExecError::SessionLost(format!(
                "session to {} already lost, not sending `{}`",
                self.config.host,
                command.program()
            )));
        }

        match tokio::time::timeout(timeout, self.exec_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(TimeoutError {
                operation: format!("remote `{}`", command.program()),
                limit: timeout,
            })),
        }
    }

    async fn exec_inner(&self, command: &CommandLine<'_>) -> exec::Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.mark_lost(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command.to_shell())
            .await
            .map_err(|e| self.mark_lost(format!("failed to exec command: {}", e)))?;

        if let Some(secret) = command.stdin() {
            channel
                .data(secret.expose().as_bytes())
                .await
                .map_err(|e| self.mark_lost(format!("failed to write stdin: {}", e)))?;
            channel
                .eof()
                .await
                .map_err(|e| self.mark_lost(format!("failed to close stdin: {}", e)))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        let mut got_exit_status = false;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status;
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                // Killed remotely: a failed command, not a lost session
                Some(ChannelMsg::ExitSignal {
                    signal_name,
                    error_message,
                    ..
                }) => {
                    tracing::debug!(signal = ?signal_name, %error_message, "remote command killed by signal");
                    exit_code = signal_exit_code(&signal_name);
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if got_exit_status {
                        break;
                    }
                }
                Some(ChannelMsg::Close) => {
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        // A channel that closes without an exit status means the transport
        // went away mid-command
        if !got_exit_status {
            return Err(self.mark_lost("channel closed without exit status".to_string()));
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Shell convention for a process killed by a signal: 128 plus its number.
fn signal_exit_code(signal: &Sig) -> u32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(_) => 0,
    };
    128 + number
}

#[async_trait]
impl CommandRunner for Session {
    async fn run(&self, command: &CommandLine<'_>) -> exec::Result<CommandOutput> {
        self.exec(command).await
    }
}
