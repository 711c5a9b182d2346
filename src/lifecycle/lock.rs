// ABOUTME: Remote deploy lock preventing concurrent deploys of one pipeline.
// ABOUTME: Atomic noclobber file creation with lock info under ~/.local/state/berth/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{DeployError, DeployFailure, DeployStep};
use crate::exec::{CommandLine, CommandRunner, ExecError, shell_quote};
use crate::types::{PipelineName, RunId};

/// State directory on the target, relative to `$HOME`.
const STATE_DIR: &str = ".local/state/berth";

/// Locks older than this are considered abandoned.
const STALE_AFTER_HOURS: i64 = 1;

/// Who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub pipeline: String,
}

impl LockInfo {
    pub fn new(pipeline: &PipelineName, run_id: &RunId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            pipeline: pipeline.to_string(),
        }
    }

    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.started_at).num_hours() >= STALE_AFTER_HOURS
    }

    /// Lock file path, left unexpanded so the remote shell resolves `$HOME`.
    pub fn lock_path(pipeline: &PipelineName) -> String {
        format!("$HOME/{}/{}.lock", STATE_DIR, pipeline)
    }
}

/// A held deploy lock. Must be released explicitly with [`DeployLock::release`].
#[derive(Debug)]
pub struct DeployLock {
    pipeline: PipelineName,
    info: LockInfo,
}

impl DeployLock {
    /// Take the lock for `pipeline`, breaking stale, corrupt or (with
    /// `force`) any existing lock.
    pub async fn acquire<R: CommandRunner + ?Sized>(
        runner: &R,
        pipeline: &PipelineName,
        run_id: &RunId,
        force: bool,
    ) -> Result<Self, DeployError> {
        let lock_path = LockInfo::lock_path(pipeline);
        ensure_state_dir(runner).await?;

        let info = LockInfo::new(pipeline, run_id);
        let json = serde_json::to_string(&info)
            .map_err(|e| lock_error(format!("failed to serialize lock info: {e}")))?;
        // set -C turns `>` into create-if-absent, which is atomic on the target
        let acquire = CommandLine::shell(format!(
            "(set -C; echo {} > \"{}\") 2>/dev/null",
            shell_quote(&json),
            lock_path
        ));

        if try_create(runner, &acquire).await? {
            tracing::debug!(pipeline = %pipeline, "deploy lock acquired");
            return Ok(Self {
                pipeline: pipeline.clone(),
                info,
            });
        }

        match read_existing(runner, &lock_path).await? {
            Some(existing) if force => {
                tracing::warn!(
                    holder = %existing.holder,
                    pid = existing.pid,
                    started_at = %existing.started_at,
                    "breaking deploy lock (forced)"
                );
            }
            Some(existing) if existing.is_stale() => {
                tracing::warn!(
                    holder = %existing.holder,
                    pid = existing.pid,
                    started_at = %existing.started_at,
                    "breaking stale deploy lock"
                );
            }
            Some(existing) => {
                return Err(DeployError::new(
                    DeployStep::AcquireLock,
                    DeployFailure::LockHeld {
                        holder: existing.holder,
                        pid: existing.pid,
                        started_at: existing.started_at,
                    },
                ));
            }
            None => {
                tracing::warn!(path = %lock_path, "deploy lock unreadable or corrupt, breaking it");
            }
        }

        remove_file(runner, &lock_path)
            .await
            .map_err(|e| DeployError::new(DeployStep::AcquireLock, e))?;

        if try_create(runner, &acquire).await? {
            Ok(Self {
                pipeline: pipeline.clone(),
                info,
            })
        } else {
            Err(lock_error(
                "lock taken by another process while breaking it".to_string(),
            ))
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Remove the lock for `pipeline` only if `run_id` holds it.
    ///
    /// For an acquire that was cancelled after the create may have landed.
    /// Returns whether a lock was removed.
    pub async fn release_if_held_by<R: CommandRunner + ?Sized>(
        runner: &R,
        pipeline: &PipelineName,
        run_id: &RunId,
    ) -> Result<bool, ExecError> {
        let lock_path = LockInfo::lock_path(pipeline);
        match read_lock_file(runner, &lock_path).await? {
            Some(info) if info.run_id == run_id.as_str() => {
                remove_file(runner, &lock_path).await?;
                tracing::debug!(pipeline = %pipeline, "deploy lock from interrupted acquire released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Remove the lock file.
    pub async fn release<R: CommandRunner + ?Sized>(self, runner: &R) -> Result<(), ExecError> {
        remove_file(runner, &LockInfo::lock_path(&self.pipeline)).await?;
        tracing::debug!(pipeline = %self.pipeline, "deploy lock released");
        Ok(())
    }
}

fn lock_error(message: String) -> DeployError {
    DeployError::new(DeployStep::AcquireLock, DeployFailure::Lock(message))
}

async fn ensure_state_dir<R: CommandRunner + ?Sized>(runner: &R) -> Result<(), DeployError> {
    let mkdir = CommandLine::shell(format!("mkdir -p \"$HOME/{STATE_DIR}\""));
    let output = runner
        .run(&mkdir)
        .await
        .map_err(|e| DeployError::new(DeployStep::AcquireLock, e))?;
    if output.success() {
        Ok(())
    } else {
        Err(lock_error(format!(
            "failed to create state directory: {}",
            output.stderr.trim()
        )))
    }
}

async fn try_create<R: CommandRunner + ?Sized>(
    runner: &R,
    acquire: &CommandLine<'_>,
) -> Result<bool, DeployError> {
    runner
        .run(acquire)
        .await
        .map(|output| output.success())
        .map_err(|e| DeployError::new(DeployStep::AcquireLock, e))
}

async fn read_existing<R: CommandRunner + ?Sized>(
    runner: &R,
    lock_path: &str,
) -> Result<Option<LockInfo>, DeployError> {
    read_lock_file(runner, lock_path)
        .await
        .map_err(|e| DeployError::new(DeployStep::AcquireLock, e))
}

/// `None` when the lock file cannot be read or parsed.
async fn read_lock_file<R: CommandRunner + ?Sized>(
    runner: &R,
    lock_path: &str,
) -> Result<Option<LockInfo>, ExecError> {
    let output = runner
        .run(&CommandLine::shell(format!("cat \"{lock_path}\"")))
        .await?;
    if !output.success() {
        return Ok(None);
    }
    Ok(serde_json::from_str(output.stdout.trim()).ok())
}

async fn remove_file<R: CommandRunner + ?Sized>(runner: &R, lock_path: &str) -> Result<(), ExecError> {
    let rm = CommandLine::shell(format!("rm -f \"{lock_path}\""));
    runner.run(&rm).await?.ensure_success(&rm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> PipelineName {
        PipelineName::new("demo").unwrap()
    }

    #[test]
    fn lock_info_records_current_process() {
        let run_id = RunId::new("run-1");
        let info = LockInfo::new(&pipeline(), &run_id);
        assert_eq!(info.pipeline, "demo");
        assert_eq!(info.run_id, "run-1");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn lock_path_is_under_state_dir() {
        assert_eq!(
            LockInfo::lock_path(&pipeline()),
            "$HOME/.local/state/berth/demo.lock"
        );
    }

    #[test]
    fn staleness_is_one_hour() {
        let mut info = LockInfo::new(&pipeline(), &RunId::new("r"));
        assert!(!info.is_stale());
        info.started_at = Utc::now() - chrono::Duration::minutes(59);
        assert!(!info.is_stale());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }
}
