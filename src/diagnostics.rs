// ABOUTME: Diagnostics accumulator for non-fatal warnings during a pipeline run.
// ABOUTME: Collects warnings that shouldn't fail a run but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockRelease,
            message: message.into(),
        }
    }

    pub fn session_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SessionDisconnect,
            message: message.into(),
        }
    }

    pub fn insecure_host_key(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::InsecureHostKey,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Deploy lock could not be removed; the lock file may remain.
    LockRelease,
    /// Session did not close cleanly.
    SessionDisconnect,
    /// Host key verification was skipped for the deploy target.
    InsecureHostKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::lock_release("failed to remove lock file"));
        diag.warn(Warning::session_disconnect("connection reset"));

        assert!(diag.has_warnings());
        let warnings = diag.into_warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, WarningKind::LockRelease);
        assert_eq!(warnings[1].kind, WarningKind::SessionDisconnect);
    }

    #[test]
    fn warnings_serialize_kind_in_snake_case() {
        let json = serde_json::to_string(&Warning::insecure_host_key("skip")).unwrap();
        assert_eq!(json, r#"{"kind":"insecure_host_key","message":"skip"}"#);
    }
}
