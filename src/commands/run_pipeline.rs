// ABOUTME: Run-pipeline command handler.
// ABOUTME: Plans stages from config, runs them and maps the outcome to an exit code.

use berth::config::Config;
use berth::error::{Error, Result};
use berth::output::Output;
use berth::pipeline::{PipelineOrchestrator, PlanOptions, plan_stages};
use berth::ssh::SshConnector;
use berth::types::RunId;

pub async fn run_pipeline(config: Config, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();

    let credentials = config.credentials()?;
    let connector = config
        .deploy
        .as_ref()
        .map(|deploy| SshConnector::new(deploy.command_timeout))
        .unwrap_or_default();
    let stages = plan_stages(&config, connector, PlanOptions { force_lock: force })?;

    let run_id = RunId::generate();
    output.progress(&format!(
        "Running pipeline {} ({}) for {}...",
        config.pipeline,
        run_id.short(),
        config.image
    ));

    let orchestrator = PipelineOrchestrator::new().with_sink(Box::new(output.clone()));
    let run = orchestrator.run(run_id, &stages, &credentials).await?;
    drop(credentials);

    for warning in run.warnings() {
        output.warning(warning);
    }

    match run.failure() {
        None => {
            output.success(&format!("Pipeline {} succeeded", config.pipeline));
            Ok(())
        }
        Some(failure) => Err(Error::PipelineFailed {
            stage: failure.stage,
            message: failure.error.to_string(),
            exit_code: failure.exit_code(),
        }),
    }
}
