// ABOUTME: Config values that are literals or environment variable references.
// ABOUTME: Secrets resolve straight into Credential handles.

use crate::credential::Credential;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

// Literal values may be secrets; only env references are shown.
impl std::fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvValue::Literal(_) => f.write_str("Literal([REDACTED])"),
            EnvValue::FromEnv { var, .. } => f.debug_struct("FromEnv").field("var", var).finish(),
        }
    }
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }

    /// Resolve into a secret handle labelled `label`.
    pub fn resolve_credential(&self, label: &str) -> Result<Credential> {
        self.resolve().map(|secret| Credential::new(label, secret))
    }
}

pub fn resolve_env_map(map: &BTreeMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        let value = EnvValue::Literal("plain".to_string());
        assert_eq!(value.resolve().unwrap(), "plain");
    }

    #[test]
    fn env_reference_reads_variable() {
        temp_env::with_var("BERTH_TEST_TOKEN", Some("from-env"), || {
            let value: EnvValue = serde_yaml::from_str("{ env: BERTH_TEST_TOKEN }").unwrap();
            assert_eq!(value.resolve().unwrap(), "from-env");
        });
    }

    #[test]
    fn missing_variable_uses_default_or_errors() {
        temp_env::with_var_unset("BERTH_TEST_UNSET", || {
            let with_default: EnvValue =
                serde_yaml::from_str("{ env: BERTH_TEST_UNSET, default: fallback }").unwrap();
            assert_eq!(with_default.resolve().unwrap(), "fallback");

            let without: EnvValue = serde_yaml::from_str("{ env: BERTH_TEST_UNSET }").unwrap();
            match without.resolve() {
                Err(Error::MissingEnvVar(var)) => assert_eq!(var, "BERTH_TEST_UNSET"),
                other => panic!("expected MissingEnvVar, got {other:?}"),
            }
        });
    }

    #[test]
    fn debug_hides_literal_values() {
        let value = EnvValue::Literal("hunter2".to_string());
        assert!(!format!("{value:?}").contains("hunter2"));
    }

    #[test]
    fn credential_carries_label() {
        let cred = EnvValue::Literal("s3cret".to_string())
            .resolve_credential("registry.password")
            .unwrap();
        assert_eq!(cred.label(), "registry.password");
        assert_eq!(cred.expose(), "s3cret");
    }
}
