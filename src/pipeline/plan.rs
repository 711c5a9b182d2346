// ABOUTME: Turns a loaded config into the ordered list of stages to run.
// ABOUTME: The connector is injected so deploys can target real or fake hosts.

use std::time::Duration;

use super::stage::{Stage, StageKind};
use super::stages::{BuildStage, DeploySettings, DeployStage, TestStage};
use crate::build::ArtifactBuilder;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::LocalRunner;
use crate::lifecycle::LaunchOptions;
use crate::registry::RegistryClient;
use crate::ssh::Connector;

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Break any existing deploy lock.
    pub force_lock: bool,
}

/// Build the stages named in `config.stages`, in the listed order.
pub fn plan_stages<C>(config: &Config, connector: C, options: PlanOptions) -> Result<Vec<Box<dyn Stage>>>
where
    C: Connector + 'static,
{
    let registry = RegistryClient::new(config.runtime).retry(config.retry_policy());
    let mut connector = Some(connector);
    let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(config.stages.len());

    for kind in config.stages.iter() {
        let stage: Box<dyn Stage> = match kind {
            StageKind::Test => Box::new(TestStage::new(
                config.test.commands.clone(),
                config.base_dir.clone(),
                config.test.timeout,
            )),
            StageKind::Build => Box::new(BuildStage::new(
                LocalRunner::new().command_timeout(config.build.timeout),
                ArtifactBuilder::new(config.runtime),
                config.build_context()?,
                config.image.clone(),
                registry.clone(),
                config.build.timeout,
            )),
            StageKind::Deploy => {
                let deploy = config.deploy.as_ref().ok_or_else(|| {
                    Error::InvalidConfig("deploy stage enabled but no deploy section".to_string())
                })?;
                let connector = connector.take().ok_or_else(|| {
                    Error::InvalidConfig("deploy stage listed more than once".to_string())
                })?;
                let settings = DeploySettings {
                    pipeline: config.pipeline.clone(),
                    target: deploy.target(),
                    port: deploy.port,
                    runtime: deploy.runtime,
                    registry: registry.clone(),
                    launch: LaunchOptions {
                        container_name: deploy.container_name.clone(),
                        restart: deploy.restart.map(|r| r.to_string()),
                        labels: deploy.labels.clone(),
                        stop_timeout: deploy.stop_timeout,
                    },
                    force_lock: options.force_lock,
                    timeout: deploy.timeout,
                    teardown_timeout: TEARDOWN_TIMEOUT,
                };
                Box::new(DeployStage::new(connector, settings))
            }
        };
        stages.push(stage);
    }

    Ok(stages)
}
