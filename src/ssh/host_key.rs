// ABOUTME: Host key verification policy for SSH connections.
// ABOUTME: strict (default), accept-new, or skip for throwaway targets.

use serde::Deserialize;
use std::fmt;

/// How the client treats a server host key that is not already trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Only keys already present in known_hosts are accepted.
    #[default]
    Strict,
    /// Unknown keys are accepted and recorded; changed keys are rejected.
    AcceptNew,
    /// No verification at all. Known to be insecure; kept for ephemeral
    /// targets whose host keys change on every boot.
    Skip,
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::Strict => write!(f, "strict"),
            HostKeyPolicy::AcceptNew => write!(f, "accept-new"),
            HostKeyPolicy::Skip => write!(f, "skip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_strict() {
        assert_eq!(HostKeyPolicy::default(), HostKeyPolicy::Strict);
    }

    #[test]
    fn deserializes_kebab_case() {
        let policy: HostKeyPolicy = serde_yaml::from_str("accept-new").unwrap();
        assert_eq!(policy, HostKeyPolicy::AcceptNew);
        let policy: HostKeyPolicy = serde_yaml::from_str("skip").unwrap();
        assert_eq!(policy, HostKeyPolicy::Skip);
    }
}
