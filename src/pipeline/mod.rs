// ABOUTME: Pipeline orchestration: stages, run state, events and planning.
// ABOUTME: Stages run in order and the first failure halts the run.

mod error;
mod event;
mod orchestrator;
mod plan;
mod run;
mod stage;
mod stages;

pub use error::{ConfigurationError, StageError, StageErrorKind, TestError};
pub use event::{EventSink, StageEvent, TracingSink};
pub use orchestrator::PipelineOrchestrator;
pub use plan::{PlanOptions, plan_stages};
pub use run::{IllegalTransition, PipelineRun, RunFailure, StageRecord, StageStatus};
pub use stage::{Artifact, ArtifactKind, Artifacts, Stage, StageContext, StageKind};
pub use stages::{BuildStage, DeploySettings, DeployStage, TestStage};
