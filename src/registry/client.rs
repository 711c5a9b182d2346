// ABOUTME: Registry login, push and pull through the container CLI.
// ABOUTME: Transient failures are retried with backoff; auth failures never are.

use super::error::{AuthError, RegistryError, RegistryOperation};
use super::retry::{FailureClass, RetryPolicy, classify_failure};
use crate::credential::RegistryLogin;
use crate::exec::{CommandLine, CommandOutput, CommandRunner, ExecError};
use crate::runtime::RuntimeType;
use crate::types::ImageReference;

/// Talks to a registry using whichever runner it is handed.
///
/// The same client drives local pushes during the build stage and remote
/// pulls over an SSH session during deploy.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    runtime: RuntimeType,
    retry: RetryPolicy,
}

impl RegistryClient {
    pub fn new(runtime: RuntimeType) -> Self {
        Self {
            runtime,
            retry: RetryPolicy::default(),
        }
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Same retry policy, different container CLI.
    pub fn with_runtime(&self, runtime: RuntimeType) -> Self {
        Self {
            runtime,
            retry: self.retry,
        }
    }

    pub fn runtime(&self) -> RuntimeType {
        self.runtime
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Log in with the password fed on stdin.
    pub async fn authenticate<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        login: &RegistryLogin,
    ) -> Result<(), AuthError> {
        let mut command = CommandLine::new(self.runtime.binary()).arg("login");
        if let Some(server) = &login.server {
            command = command.arg(server);
        }
        let command = command
            .args(["--username", login.username.as_str(), "--password-stdin"])
            .stdin_secret(&login.password);

        tracing::debug!(
            username = %login.username,
            credential = %login.password,
            server = login.server.as_deref().unwrap_or("default"),
            "registry login"
        );

        let output = runner
            .run(&command)
            .await
            .map_err(|source| AuthError::Exec {
                credential: login.password.label().to_string(),
                source,
            })?;

        if output.success() {
            return Ok(());
        }

        Err(AuthError::Rejected {
            credential: login.password.label().to_string(),
            username: login.username.clone(),
            detail: login.password.scrub(&failure_detail(&output)),
        })
    }

    pub async fn push<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        image: &ImageReference,
    ) -> Result<(), RegistryError> {
        self.transfer(runner, RegistryOperation::Push, image).await
    }

    pub async fn pull<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        image: &ImageReference,
    ) -> Result<(), RegistryError> {
        self.transfer(runner, RegistryOperation::Pull, image).await
    }

    async fn transfer<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        operation: RegistryOperation,
        image: &ImageReference,
    ) -> Result<(), RegistryError> {
        let command = CommandLine::new(self.runtime.binary())
            .arg(operation.to_string())
            .arg(image.to_string());

        let mut attempt: u32 = 0;
        loop {
            // A runner timeout is a network-class failure; a lost session is not
            let output = match runner.run(&command).await {
                Ok(output) => output,
                Err(ExecError::Timeout(timeout)) => {
                    let detail = timeout.to_string();
                    if attempt < self.retry.max_retries {
                        self.back_off(operation, image, attempt, &detail).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(RegistryError::Unavailable {
                        operation,
                        image: image.clone(),
                        attempts: attempt + 1,
                        last_error: detail,
                    });
                }
                Err(source) => {
                    return Err(RegistryError::Exec {
                        operation,
                        image: image.clone(),
                        source,
                    });
                }
            };

            if output.success() {
                if attempt > 0 {
                    tracing::info!(%operation, %image, attempts = attempt + 1, "registry transfer succeeded after retry");
                }
                return Ok(());
            }

            let detail = failure_detail(&output);
            match classify_failure(&detail) {
                FailureClass::Transient if attempt < self.retry.max_retries => {
                    self.back_off(operation, image, attempt, &detail).await;
                    attempt += 1;
                }
                FailureClass::Transient => {
                    return Err(RegistryError::Unavailable {
                        operation,
                        image: image.clone(),
                        attempts: attempt + 1,
                        last_error: detail,
                    });
                }
                FailureClass::Unauthorized => {
                    return Err(RegistryError::Unauthorized {
                        operation,
                        image: image.clone(),
                        detail,
                    });
                }
                FailureClass::NotFound => {
                    return Err(RegistryError::NotFound {
                        image: image.clone(),
                    });
                }
                FailureClass::Permanent => {
                    return Err(RegistryError::Failed {
                        operation,
                        image: image.clone(),
                        exit_code: output.exit_code,
                        detail,
                    });
                }
            }
        }
    }

    async fn back_off(
        &self,
        operation: RegistryOperation,
        image: &ImageReference,
        attempt: u32,
        detail: &str,
    ) {
        let delay = self.retry.delay_for(attempt);
        tracing::warn!(
            %operation,
            %image,
            attempt = attempt + 1,
            max_attempts = self.retry.max_retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %detail,
            "transient registry failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Prefer stderr, fall back to stdout.
fn failure_detail(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        output.stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}
