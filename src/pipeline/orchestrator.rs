// ABOUTME: Runs stages in order with fail-fast semantics and wiring checks.
// ABOUTME: Owns the run state machine and fans stage events out to sinks.

use std::time::Duration;

use super::error::{ConfigurationError, StageError};
use super::event::{EventSink, StageEvent, TracingSink};
use super::run::{IllegalTransition, PipelineRun, StageStatus};
use super::stage::{Artifacts, Stage, StageContext};
use crate::credential::Credentials;
use crate::deadline::{Deadline, TimeoutError};
use crate::diagnostics::Diagnostics;
use crate::types::RunId;

/// Time a stage gets past its own timeout to release locks and close sessions.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// Sequences stages. Performs no stage work itself.
pub struct PipelineOrchestrator {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        Self {
            sinks: vec![Box::new(TracingSink)],
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Check that stages follow test, build, deploy order and that every
    /// input of every stage is produced by an earlier stage.
    ///
    /// Returns the index of the first stage whose wiring is broken.
    pub fn validate(stages: &[Box<dyn Stage>]) -> Result<(), (usize, ConfigurationError)> {
        for (index, stage) in stages.iter().enumerate() {
            let previous = index.checked_sub(1).map(|i| stages[i].kind());
            if let Some(previous) = previous.filter(|previous| *previous > stage.kind()) {
                return Err((
                    index,
                    ConfigurationError::OutOfOrder {
                        stage: stage.kind(),
                        after: previous,
                    },
                ));
            }
            for input in stage.inputs() {
                let produced = stages[..index]
                    .iter()
                    .any(|earlier| earlier.outputs().contains(input));
                if !produced {
                    return Err((
                        index,
                        ConfigurationError::MissingInput {
                            stage: stage.kind(),
                            input: *input,
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Run `stages` in order, stopping at the first failure.
    ///
    /// Stage failures are recorded in the returned run. An error is returned
    /// only if the run state machine itself is driven out of order.
    pub async fn run(
        &self,
        run_id: RunId,
        stages: &[Box<dyn Stage>],
        credentials: &Credentials,
    ) -> Result<PipelineRun, IllegalTransition> {
        let mut run = PipelineRun::new(run_id.clone(), stages.iter().map(|s| s.kind()));
        tracing::info!(run_id = %run_id, stages = stages.len(), "pipeline run started");

        if let Err((index, error)) = Self::validate(stages) {
            tracing::error!(run_id = %run_id, index, %error, "stage wiring invalid, nothing executed");
            run.fail(index, error.into());
            run.finish(Vec::new());
            return Ok(run);
        }

        let mut artifacts = Artifacts::default();
        let mut diagnostics = Diagnostics::default();

        for (index, stage) in stages.iter().enumerate() {
            if let Some(input) = stage.inputs().iter().find(|i| !artifacts.contains(**i)) {
                run.fail(
                    index,
                    ConfigurationError::MissingInput {
                        stage: stage.kind(),
                        input: *input,
                    }
                    .into(),
                );
                break;
            }

            self.transition(&mut run, index, StageStatus::Running, None)?;

            let deadline = Deadline::after(stage.timeout());
            let mut ctx = StageContext::new(&run_id, credentials, deadline, &artifacts, &mut diagnostics);
            let result = execute_bounded(stage.as_ref(), &mut ctx, deadline).await;
            let outputs = ctx.into_outputs();

            let result = result.and_then(|()| {
                match stage.outputs().iter().find(|o| !outputs.contains(**o)) {
                    Some(output) => Err(StageError::from(ConfigurationError::MissingOutput {
                        stage: stage.kind(),
                        output: *output,
                    })),
                    None => Ok(()),
                }
            });

            match result {
                Ok(()) => {
                    artifacts.merge(outputs);
                    self.transition(&mut run, index, StageStatus::Succeeded, None)?;
                }
                Err(error) => {
                    self.transition(&mut run, index, StageStatus::Failed, Some(&error))?;
                    run.fail(index, error);
                    break;
                }
            }
        }

        run.finish(diagnostics.into_warnings());
        match run.failure() {
            Some(failure) => tracing::error!(run_id = %run_id, "pipeline run failed: {}", failure),
            None => tracing::info!(run_id = %run_id, "pipeline run succeeded"),
        }
        Ok(run)
    }

    fn transition(
        &self,
        run: &mut PipelineRun,
        index: usize,
        to: StageStatus,
        error: Option<&StageError>,
    ) -> Result<(), IllegalTransition> {
        let (kind, started_at, finished_at) = {
            let record = run.advance(index, to)?;
            (record.kind, record.started_at, record.finished_at)
        };
        let duration_ms = match (started_at, finished_at) {
            (Some(start), Some(end)) => u64::try_from((end - start).num_milliseconds()).ok(),
            _ => None,
        };
        let event = StageEvent {
            run_id: run.id().clone(),
            stage_index: index,
            stage: kind,
            status: to,
            at: finished_at.or(started_at).unwrap_or_else(chrono::Utc::now),
            duration_ms,
            error_kind: error.map(StageError::kind),
            error: error.map(ToString::to_string),
        };

        for sink in &self.sinks {
            sink.emit(&event);
        }
        run.record_event(event);
        Ok(())
    }
}

/// Backstop in case a stage ignores its deadline.
async fn execute_bounded(
    stage: &dyn Stage,
    ctx: &mut StageContext<'_>,
    deadline: Deadline,
) -> Result<(), StageError> {
    let limit = deadline.limit() + TEARDOWN_GRACE;
    match tokio::time::timeout(limit, stage.execute(ctx)).await {
        Ok(result) => result,
        Err(_) => Err(TimeoutError {
            operation: format!("{} stage", stage.kind()),
            limit: deadline.limit(),
        }
        .into()),
    }
}
