// ABOUTME: The concrete test, build and deploy stages.
// ABOUTME: Build publishes the pushed image; deploy consumes it on the remote host.

use async_trait::async_trait;
use snafu::ResultExt;
use std::path::PathBuf;
use std::time::Duration;

use super::error::{
    AuthSnafu, BuildSnafu, ConfigurationError, ConnectSnafu, RegistrySnafu, StageError, TestError,
    TestSnafu,
};
use super::stage::{Artifact, ArtifactKind, Stage, StageContext, StageKind};
use crate::build::{ArtifactBuilder, BuildContext};
use crate::config::RemoteTarget;
use crate::credential::Credentials;
use crate::diagnostics::Warning;
use crate::exec::{CommandLine, CommandRunner, LocalRunner};
use crate::lifecycle::{
    ContainerLifecycleManager, DeployError, DeployFailure, DeployLock, DeployStep, LaunchOptions,
    TransitionReport,
};
use crate::registry::RegistryClient;
use crate::runtime::{DetectionError, RuntimeType, detect_runtime};
use crate::ssh::{Connector, HostKeyPolicy};
use crate::types::{ImageReference, PipelineName, PortBinding, RunId};

const IMAGE: &[ArtifactKind] = &[ArtifactKind::Image];

/// Runs test commands locally through `sh -c`.
#[derive(Debug, Clone)]
pub struct TestStage {
    commands: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl TestStage {
    pub fn new(commands: Vec<String>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            commands,
            working_dir: working_dir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Stage for TestStage {
    fn kind(&self) -> StageKind {
        StageKind::Test
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let runner = LocalRunner::new()
            .working_dir(&self.working_dir)
            .command_timeout(self.timeout);

        for command in &self.commands {
            tracing::info!(command = %command, "running test command");
            let line = CommandLine::shell(command.as_str());
            let output = ctx
                .deadline
                .run("test command", async {
                    runner
                        .run(&line)
                        .await
                        .map_err(TestError::from)
                        .context(TestSnafu)
                })
                .await?;

            if !output.success() {
                let stderr: Vec<&str> = output.stderr.lines().collect();
                for text in &stderr[stderr.len().saturating_sub(20)..] {
                    tracing::warn!(target: "berth::test_output", "{}", text);
                }
                return Err(TestError::CommandFailed {
                    command: command.clone(),
                    exit_code: output.exit_code,
                })
                .context(TestSnafu);
            }
        }
        Ok(())
    }
}

/// Builds the image, logs in if credentials exist, and pushes.
///
/// `runner` is normally a [`LocalRunner`]; tests hand in a fake.
#[derive(Debug, Clone)]
pub struct BuildStage<R: CommandRunner> {
    runner: R,
    builder: ArtifactBuilder,
    context: BuildContext,
    image: ImageReference,
    registry: RegistryClient,
    timeout: Duration,
}

impl<R: CommandRunner> BuildStage<R> {
    pub fn new(
        runner: R,
        builder: ArtifactBuilder,
        context: BuildContext,
        image: ImageReference,
        registry: RegistryClient,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            builder,
            context,
            image,
            registry,
            timeout,
        }
    }
}

#[async_trait]
impl<R: CommandRunner> Stage for BuildStage<R> {
    fn kind(&self) -> StageKind {
        StageKind::Build
    }

    fn outputs(&self) -> &[ArtifactKind] {
        IMAGE
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let runner = &self.runner;
        let credentials = ctx.credentials;
        let deadline = ctx.deadline;

        let image = deadline
            .run("image build", async {
                self.builder
                    .build(runner, &self.context, &self.image)
                    .await
                    .context(BuildSnafu)
            })
            .await?;

        if let Some(login) = &credentials.registry {
            deadline
                .run("registry login", async {
                    self.registry
                        .authenticate(runner, login)
                        .await
                        .context(AuthSnafu)
                })
                .await?;
        }

        deadline
            .run("image push", async {
                self.registry.push(runner, &image).await.context(RegistrySnafu)
            })
            .await?;

        tracing::info!(%image, "image pushed");
        ctx.publish(Artifact::Image(image));
        Ok(())
    }
}

/// Deploy stage settings that do not depend on the transport.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub pipeline: PipelineName,
    pub target: RemoteTarget,
    pub port: PortBinding,
    /// Detected over the session when unset.
    pub runtime: Option<RuntimeType>,
    pub registry: RegistryClient,
    pub launch: LaunchOptions,
    pub force_lock: bool,
    pub timeout: Duration,
    /// Bound on lock release and disconnect after the deploy body.
    pub teardown_timeout: Duration,
}

/// How far deploy lock handling got before the deploy body ended.
#[derive(Debug)]
enum LockState {
    NotTaken,
    /// Acquire was in flight; the lock file may or may not exist.
    Acquiring,
    Held(DeployLock),
}

/// Replaces the running container on the remote host with the built image.
pub struct DeployStage<C: Connector> {
    connector: C,
    settings: DeploySettings,
}

impl<C: Connector> DeployStage<C> {
    pub fn new(connector: C, settings: DeploySettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Everything between connect and teardown. `lock` tracks acquisition
    /// so teardown can release it even if this is cancelled.
    async fn deploy_body(
        &self,
        session: &mut C::Session,
        lock: &mut LockState,
        image: &ImageReference,
        run_id: &RunId,
        credentials: &Credentials,
    ) -> Result<TransitionReport, StageError> {
        let settings = &self.settings;

        let runtime = detect_runtime(&*session, settings.runtime)
            .await
            .map_err(|e| {
                let cause = match e {
                    DetectionError::NoRuntimeFound => DeployFailure::NoRuntime,
                    DetectionError::Exec(e) => DeployFailure::Exec(e),
                };
                DeployError::new(DeployStep::DetectRuntime, cause)
            })?;
        tracing::debug!(%runtime, "using remote runtime");

        *lock = LockState::Acquiring;
        match DeployLock::acquire(&*session, &settings.pipeline, run_id, settings.force_lock).await {
            Ok(held) => *lock = LockState::Held(held),
            Err(e) => {
                *lock = LockState::NotTaken;
                return Err(e.into());
            }
        }

        let manager = ContainerLifecycleManager::new(&settings.registry, runtime, settings.launch.clone());

        if let Some(login) = &credentials.registry {
            settings
                .registry
                .with_runtime(runtime)
                .authenticate(&*session, login)
                .await
                .map_err(|e| DeployError::new(DeployStep::RegistryLogin, e))?;
        }

        Ok(manager.transition(session, image, &settings.port).await?)
    }

    async fn teardown(
        &self,
        ctx: &mut StageContext<'_>,
        session: C::Session,
        lock: LockState,
    ) {
        let limit = self.settings.teardown_timeout;

        let released = match lock {
            LockState::NotTaken => None,
            LockState::Acquiring => Some(
                tokio::time::timeout(
                    limit,
                    DeployLock::release_if_held_by(&session, &self.settings.pipeline, ctx.run_id),
                )
                .await
                .map(|result| result.map(|_| ())),
            ),
            LockState::Held(lock) => Some(tokio::time::timeout(limit, lock.release(&session)).await),
        };
        match released {
            None | Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => ctx.warn(Warning::lock_release(format!(
                "failed to release deploy lock: {e}"
            ))),
            Some(Err(_)) => ctx.warn(Warning::lock_release(format!(
                "releasing deploy lock timed out after {limit:?}"
            ))),
        }

        match tokio::time::timeout(limit, self.connector.disconnect(session)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => ctx.warn(Warning::session_disconnect(format!(
                "failed to disconnect from {}: {e}",
                self.settings.target.host
            ))),
            Err(_) => ctx.warn(Warning::session_disconnect(format!(
                "disconnect from {} timed out after {limit:?}",
                self.settings.target.host
            ))),
        }
    }
}

#[async_trait]
impl<C: Connector> Stage for DeployStage<C> {
    fn kind(&self) -> StageKind {
        StageKind::Deploy
    }

    fn inputs(&self) -> &[ArtifactKind] {
        IMAGE
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let image = ctx
            .inputs()
            .image()
            .cloned()
            .ok_or(ConfigurationError::MissingInput {
                stage: StageKind::Deploy,
                input: ArtifactKind::Image,
            })?;
        let credentials = ctx.credentials;
        let run_id = ctx.run_id;
        let deadline = ctx.deadline;
        let target = &self.settings.target;

        if target.host_key_policy == HostKeyPolicy::Skip {
            ctx.warn(Warning::insecure_host_key(format!(
                "host key verification disabled for {}",
                target.host
            )));
        }

        let mut session = deadline
            .run("connect", async {
                self.connector
                    .connect(target, credentials.ssh_key.as_ref())
                    .await
                    .context(ConnectSnafu)
            })
            .await?;

        let mut lock = LockState::NotTaken;
        let result = deadline
            .run(
                "deploy",
                self.deploy_body(&mut session, &mut lock, &image, run_id, credentials),
            )
            .await;

        self.teardown(ctx, session, lock).await;

        let report = result?;
        tracing::info!(
            host = %target.host,
            %image,
            stopped = report.stopped.len(),
            removed = report.removed.len(),
            already_absent = report.already_absent.len(),
            container = report.launched.as_ref().map(|id| id.short()).unwrap_or("-"),
            "deploy finished"
        );
        Ok(())
    }
}
