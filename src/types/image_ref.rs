// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Handles formats like demo, demo:1.0, registry.example.com:5000/org/demo:1.0.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("image digests are not supported, use a tag: {0}")]
    DigestUnsupported(String),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// An image repository plus tag. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    tag: String,
}

impl ImageReference {
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, ParseImageRefError> {
        let repository = repository.into();
        let tag = tag.into();
        Self::validate_repository(&repository)?;
        Self::validate_tag(&tag)?;
        Ok(Self { repository, tag })
    }

    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if input.contains('@') {
            return Err(ParseImageRefError::DigestUnsupported(input.to_string()));
        }

        // A colon followed by a slash belongs to a registry port, not a tag
        let (repository, tag) = match input.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, after),
            _ => (input, "latest"),
        };

        Self::new(repository, tag)
    }

    fn validate_repository(repository: &str) -> Result<(), ParseImageRefError> {
        if repository.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        for c in repository.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_') {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }

        if repository.starts_with('/')
            || repository.ends_with('/')
            || repository.contains("//")
        {
            return Err(ParseImageRefError::InvalidFormat(repository.to_string()));
        }

        Ok(())
    }

    fn validate_tag(tag: &str) -> Result<(), ParseImageRefError> {
        if tag.is_empty() || tag.len() > 128 {
            return Err(ParseImageRefError::InvalidFormat(format!(":{}", tag)));
        }

        for c in tag.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_') {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }

        Ok(())
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Registry host if the first path component names one.
    pub fn registry(&self) -> Option<&str> {
        let (first, _) = self.repository.split_once('/')?;
        if first.contains('.') || first.contains(':') || first == "localhost" {
            Some(first)
        } else {
            None
        }
    }

    /// Same repository, different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self, ParseImageRefError> {
        Self::new(self.repository.clone(), tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
