// ABOUTME: Host-to-container port binding for launched containers.
// ABOUTME: Parses "5000", "8080:80" and "8080:80/udp".

use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortBindingError {
    #[error("port binding cannot be empty")]
    Empty,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("invalid port binding format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortBinding {
    /// Bind the same port number on host and container.
    pub fn same(port: u16) -> Self {
        Self {
            host_port: port,
            container_port: port,
            protocol: Protocol::Tcp,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, PortBindingError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(PortBindingError::Empty);
        }

        let (port_part, protocol) = match spec.split_once('/') {
            Some((ports, "tcp")) => (ports, Protocol::Tcp),
            Some((ports, "udp")) => (ports, Protocol::Udp),
            Some((_, other)) => {
                return Err(PortBindingError::UnsupportedProtocol(other.to_string()));
            }
            None => (spec, Protocol::Tcp),
        };

        let parts: Vec<&str> = port_part.split(':').collect();
        let (host_port, container_port) = match parts.as_slice() {
            [port] => {
                let port = parse_port(port)?;
                (port, port)
            }
            [host, container] => (parse_port(host)?, parse_port(container)?),
            _ => return Err(PortBindingError::InvalidFormat(spec.to_string())),
        };

        Ok(Self {
            host_port,
            container_port,
            protocol,
        })
    }
}

fn parse_port(value: &str) -> Result<u16, PortBindingError> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(PortBindingError::InvalidPort(value.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Renders in the `-p` syntax accepted by docker and podman.
impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if self.protocol == Protocol::Udp {
            write!(f, "/udp")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for PortBinding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u16),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(port) if port > 0 => Ok(PortBinding::same(port)),
            Raw::Number(port) => Err(serde::de::Error::custom(PortBindingError::InvalidPort(
                port.to_string(),
            ))),
            Raw::Text(text) => PortBinding::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}
