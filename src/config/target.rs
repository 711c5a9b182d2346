// ABOUTME: Deploy target configuration for SSH connections.
// ABOUTME: Parses "host", "user@host", "host:port", "user@host:port" or a detailed map.

use crate::ssh::{HostKeyPolicy, SessionConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// The host a pipeline deploys to. Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

impl RemoteTarget {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, _)) if user.is_empty() => {
                return Err("user cannot be empty".to_string());
            }
            Some((user, rest)) => (user.to_string(), rest),
            None => (default_user(), s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| format!("invalid port: {}", port))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(RemoteTarget {
            host: host.to_string(),
            port,
            user,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
        })
    }

    /// SSH session settings for this target.
    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(&self.host, &self.user)
            .port(self.port)
            .host_key_policy(self.host_key_policy);
        match &self.known_hosts {
            Some(path) => config.known_hosts_path(expand_home(path)),
            None => config,
        }
    }
}

/// Expand a leading `~/` using `$HOME`.
pub(crate) fn expand_home(path: &std::path::Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

/// A target written either as `user@host:port` or as a map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TargetEntry {
    Simple(String),
    Detailed(RemoteTarget),
}

impl TargetEntry {
    pub(crate) fn into_target(self) -> Result<RemoteTarget, String> {
        match self {
            TargetEntry::Simple(s) => RemoteTarget::parse(&s),
            TargetEntry::Detailed(t) if t.host.trim().is_empty() => {
                Err("hostname cannot be empty".to_string())
            }
            TargetEntry::Detailed(t) => Ok(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port() {
        let t = RemoteTarget::parse("ubuntu@ec2-1-2-3-4.compute.amazonaws.com:2222").unwrap();
        assert_eq!(t.user, "ubuntu");
        assert_eq!(t.host, "ec2-1-2-3-4.compute.amazonaws.com");
        assert_eq!(t.port, 2222);
        assert_eq!(t.host_key_policy, HostKeyPolicy::Strict);
    }

    #[test]
    fn port_defaults_to_22() {
        let t = RemoteTarget::parse("deploy@example.com").unwrap();
        assert_eq!(t.port, 22);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(RemoteTarget::parse("").is_err());
        assert!(RemoteTarget::parse("@host").is_err());
        assert!(RemoteTarget::parse("user@:22").is_err());
        assert!(RemoteTarget::parse("host:notaport").is_err());
        assert!(RemoteTarget::parse("host:0").is_err());
    }

    #[test]
    fn expands_home_in_known_hosts() {
        temp_env::with_var("HOME", Some("/home/ci"), || {
            assert_eq!(
                expand_home(std::path::Path::new("~/.ssh/known_hosts")),
                PathBuf::from("/home/ci/.ssh/known_hosts")
            );
            assert_eq!(
                expand_home(std::path::Path::new("/etc/ssh/known_hosts")),
                PathBuf::from("/etc/ssh/known_hosts")
            );
        });
    }
}
