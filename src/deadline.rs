// ABOUTME: Caller-supplied deadlines for blocking operations.
// ABOUTME: Exceeding a deadline drops the in-flight future and yields a TimeoutError.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Error)]
#[error("{operation} timed out after {limit:?}")]
pub struct TimeoutError {
    pub operation: String,
    pub limit: Duration,
}

/// A point in time by which an operation must complete.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Run `fut` until it completes or the deadline passes.
    ///
    /// On expiry the future is dropped, which cancels it and releases whatever
    /// it owned.
    pub async fn run<F, T, E>(&self, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<TimeoutError>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(TimeoutError {
                operation: operation.to_string(),
                limit: self.limit,
            }
            .into()),
        }
    }
}
