// ABOUTME: Idempotent container replacement on a remote host.
// ABOUTME: list, stop, remove, pull, run; absent containers count as already handled.

use super::error::{DeployError, DeployFailure, DeployStep, Result};
use crate::exec::{CommandLine, CommandOutput, CommandRunner};
use crate::registry::RegistryClient;
use crate::runtime::RuntimeType;
use crate::types::{ContainerId, ImageReference, PortBinding};
use std::collections::BTreeMap;
use std::time::Duration;

/// Output meaning a stop or remove target is already gone.
const ABSENT_MARKERS: &[&str] = &["no such container", "no container with name or id"];

const NOT_RUNNING_MARKERS: &[&str] = &["is not running", "container not running"];

const REMOVAL_IN_PROGRESS_MARKERS: &[&str] = &["already in progress"];

const PERMISSION_MARKERS: &[&str] = &["permission denied", "operation not permitted"];

/// Settings applied to the launched container.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub container_name: Option<String>,
    pub restart: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub stop_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            container_name: None,
            restart: None,
            labels: BTreeMap::new(),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// What a transition did on the host.
#[derive(Debug, Clone, Default)]
pub struct TransitionReport {
    /// Containers found at the start.
    pub found: Vec<ContainerId>,
    pub stopped: Vec<ContainerId>,
    pub already_stopped: Vec<ContainerId>,
    pub removed: Vec<ContainerId>,
    /// Containers that disappeared between listing and stop/remove.
    pub already_absent: Vec<ContainerId>,
    pub launched: Option<ContainerId>,
}

#[derive(Debug)]
enum StepOutcome {
    Done,
    NotRunning,
    Absent,
}

/// Replaces whatever runs on the host with one container of the target image.
#[derive(Debug, Clone)]
pub struct ContainerLifecycleManager {
    registry: RegistryClient,
    runtime: RuntimeType,
    options: LaunchOptions,
}

impl ContainerLifecycleManager {
    /// The registry client is switched to `runtime` so pulls use the same CLI.
    pub fn new(registry: &RegistryClient, runtime: RuntimeType, options: LaunchOptions) -> Self {
        Self {
            registry: registry.with_runtime(runtime),
            runtime,
            options,
        }
    }

    pub fn runtime(&self) -> RuntimeType {
        self.runtime
    }

    /// Move the host from any prior state to exactly one container running
    /// `target` on `port`.
    ///
    /// Containers absent when stopped or removed are tolerated; any other
    /// failure aborts at the failing step without undoing earlier steps.
    pub async fn transition<S: CommandRunner>(
        &self,
        session: &mut S,
        target: &ImageReference,
        port: &PortBinding,
    ) -> Result<TransitionReport> {
        let session: &S = session;
        let mut report = TransitionReport {
            found: self.list_containers(session).await?,
            ..Default::default()
        };
        tracing::info!(count = report.found.len(), %target, "replacing containers");

        for id in &report.found {
            match self.stop(session, id).await? {
                StepOutcome::Done => report.stopped.push(id.clone()),
                StepOutcome::NotRunning => report.already_stopped.push(id.clone()),
                StepOutcome::Absent => report.already_absent.push(id.clone()),
            }
        }

        for id in &report.found {
            if report.already_absent.contains(id) {
                continue;
            }
            match self.remove(session, id).await? {
                StepOutcome::Absent => report.already_absent.push(id.clone()),
                _ => report.removed.push(id.clone()),
            }
        }

        self.registry
            .pull(session, target)
            .await
            .map_err(|e| DeployError::new(DeployStep::PullImage, e))?;

        let launched = self.launch(session, target, port).await?;
        tracing::info!(container = %launched.short(), %target, %port, "container launched");
        report.launched = Some(launched);

        Ok(report)
    }

    async fn list_containers<S: CommandRunner>(&self, session: &S) -> Result<Vec<ContainerId>> {
        let command = self.command().args(["ps", "-aq", "--no-trunc"]);
        let output = run_step(session, &command, DeployStep::ListContainers).await?;
        if !output.success() {
            return Err(failure(DeployStep::ListContainers, &output));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ContainerId::new)
            .collect())
    }

    async fn stop<S: CommandRunner>(&self, session: &S, id: &ContainerId) -> Result<StepOutcome> {
        let step = DeployStep::StopContainer(id.clone());
        let command = self
            .command()
            .arg("stop")
            .arg("-t")
            .arg(self.options.stop_timeout.as_secs().to_string())
            .arg(id.as_str());
        let output = run_step(session, &command, step.clone()).await?;
        if output.success() {
            tracing::debug!(container = %id.short(), "stopped");
            return Ok(StepOutcome::Done);
        }
        tolerate(step, &output, NOT_RUNNING_MARKERS)
    }

    async fn remove<S: CommandRunner>(&self, session: &S, id: &ContainerId) -> Result<StepOutcome> {
        let step = DeployStep::RemoveContainer(id.clone());
        let command = self.command().arg("rm").arg(id.as_str());
        let output = run_step(session, &command, step.clone()).await?;
        if output.success() {
            tracing::debug!(container = %id.short(), "removed");
            return Ok(StepOutcome::Done);
        }
        tolerate(step, &output, REMOVAL_IN_PROGRESS_MARKERS)
    }

    pub fn launch_command<'a>(&self, target: &ImageReference, port: &PortBinding) -> CommandLine<'a> {
        let mut command = self
            .command()
            .args(["run", "-d", "-p"])
            .arg(port.to_string());
        if let Some(name) = &self.options.container_name {
            command = command.arg("--name").arg(name);
        }
        if let Some(restart) = &self.options.restart {
            command = command.arg("--restart").arg(restart);
        }
        for (key, value) in &self.options.labels {
            command = command.arg("--label").arg(format!("{key}={value}"));
        }
        command.arg(target.to_string())
    }

    async fn launch<S: CommandRunner>(
        &self,
        session: &S,
        target: &ImageReference,
        port: &PortBinding,
    ) -> Result<ContainerId> {
        let command = self.launch_command(target, port);
        let output = run_step(session, &command, DeployStep::LaunchContainer).await?;
        if !output.success() {
            return Err(failure(DeployStep::LaunchContainer, &output));
        }

        // Some CLIs print pull progress first; the id is the last line
        match output.stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) {
            Some(id) => Ok(ContainerId::new(id)),
            None => Err(DeployError::new(
                DeployStep::LaunchContainer,
                DeployFailure::CommandFailed {
                    exit_code: output.exit_code,
                    stderr: "no container id in output".to_string(),
                },
            )),
        }
    }

    fn command<'a>(&self) -> CommandLine<'a> {
        CommandLine::new(self.runtime.binary())
    }
}

async fn run_step<S: CommandRunner>(
    session: &S,
    command: &CommandLine<'_>,
    step: DeployStep,
) -> Result<CommandOutput> {
    tracing::debug!(step = %step, command = %command, "deploy step");
    session
        .run(command)
        .await
        .map_err(|e| DeployError::new(step, e))
}

/// Decide whether a failed stop or remove is already satisfied.
fn tolerate(step: DeployStep, output: &CommandOutput, also_ok: &[&str]) -> Result<StepOutcome> {
    let text = format!("{}\n{}", output.stderr, output.stdout).to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if has(PERMISSION_MARKERS) {
        return Err(DeployError::new(
            step,
            DeployFailure::PermissionDenied(output.stderr.trim().to_string()),
        ));
    }
    if has(ABSENT_MARKERS) {
        tracing::debug!(step = %step, "container already absent");
        return Ok(StepOutcome::Absent);
    }
    if has(also_ok) {
        tracing::debug!(step = %step, "already satisfied");
        return Ok(StepOutcome::NotRunning);
    }
    Err(failure(step, output))
}

fn failure(step: DeployStep, output: &CommandOutput) -> DeployError {
    DeployError::new(
        step,
        DeployFailure::CommandFailed {
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        },
    )
}
