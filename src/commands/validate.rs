// ABOUTME: Validate command handler.
// ABOUTME: Checks config and stage wiring without touching any host.

use berth::config::Config;
use berth::error::{Error, Result};
use berth::output::Output;
use berth::pipeline::{PipelineOrchestrator, PlanOptions, plan_stages};
use berth::ssh::SshConnector;

pub fn validate(config: &Config, output: &Output) -> Result<()> {
    let stages = plan_stages(config, SshConnector::default(), PlanOptions::default())?;

    if let Err((index, error)) = PipelineOrchestrator::validate(&stages) {
        return Err(Error::InvalidConfig(format!("stage {}: {error}", index + 1)));
    }

    let names: Vec<&str> = stages.iter().map(|s| s.kind().as_str()).collect();
    output.success(&format!(
        "Config valid: pipeline {} runs {}",
        config.pipeline,
        names.join(" → ")
    ));
    Ok(())
}
