// ABOUTME: Retry policy and failure classification for registry transfers.
// ABOUTME: Exponential backoff for transient network failures only.

use serde::Deserialize;
use std::time::Duration;

/// Bounded exponential backoff for push and pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries", rename = "retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff", rename = "backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): `initial * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }
}

/// How a failed registry command should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Unauthorized,
    NotFound,
    Permanent,
}

const UNAUTHORIZED_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication required",
    "denied",
    "forbidden",
    "incorrect username or password",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "manifest unknown",
    "not found",
    "does not exist",
    "repository name not known",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "broken pipe",
    "unexpected eof",
    "temporary failure",
    "network is unreachable",
    "no route to host",
    "tls handshake",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway",
    "toomanyrequests",
    "too many requests",
];

/// Classify backend output from a failed push or pull.
///
/// Authorization markers win over everything else so a rejected login is
/// never retried.
pub fn classify_failure(output: &str) -> FailureClass {
    let lower = output.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(UNAUTHORIZED_MARKERS) {
        FailureClass::Unauthorized
    } else if has(TRANSIENT_MARKERS) {
        FailureClass::Transient
    } else if has(NOT_FOUND_MARKERS) {
        FailureClass::NotFound
    } else {
        FailureClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn default_policy_retries_three_times() {
        assert_eq!(RetryPolicy::default().max_retries, 3);
    }

    #[test]
    fn classifies_network_errors_as_transient() {
        assert_eq!(
            classify_failure("Get https://registry-1.docker.io/v2/: net/http: TLS handshake timeout"),
            FailureClass::Transient
        );
        assert_eq!(
            classify_failure("read tcp 10.0.0.1:443: connection reset by peer"),
            FailureClass::Transient
        );
    }

    #[test]
    fn classifies_auth_errors_as_unauthorized() {
        assert_eq!(
            classify_failure("denied: requested access to the resource is denied"),
            FailureClass::Unauthorized
        );
        assert_eq!(
            classify_failure("unauthorized: authentication required"),
            FailureClass::Unauthorized
        );
    }

    #[test]
    fn classifies_missing_manifest_as_not_found() {
        assert_eq!(
            classify_failure("Error response from daemon: manifest for demo:9.9 not found: manifest unknown"),
            FailureClass::NotFound
        );
    }

    #[test]
    fn unknown_output_is_permanent() {
        assert_eq!(classify_failure("invalid reference format"), FailureClass::Permanent);
    }
}
