// ABOUTME: DNS-compatible pipeline name validation.
// ABOUTME: Names key the remote deploy lock and container labels.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineNameError {
    #[error("pipeline name cannot be empty")]
    Empty,

    #[error("pipeline name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("pipeline name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("pipeline name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("pipeline name must be lowercase")]
    NotLowercase,

    #[error("invalid character in pipeline name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineName(String);

impl PipelineName {
    pub fn new(value: &str) -> Result<Self, PipelineNameError> {
        if value.is_empty() {
            return Err(PipelineNameError::Empty);
        }

        if value.len() > 63 {
            return Err(PipelineNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(PipelineNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(PipelineNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(PipelineNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(PipelineNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
