// ABOUTME: Registry access: login, push and pull with retry.
// ABOUTME: Re-exports the client, its policy and its errors.

mod client;
mod error;
mod retry;

pub use client::RegistryClient;
pub use error::{AuthError, RegistryError, RegistryOperation};
pub use retry::{FailureClass, RetryPolicy, classify_failure};
