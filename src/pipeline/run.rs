// ABOUTME: Pipeline run state: per-stage records, events, warnings and failure.
// ABOUTME: Stage status only moves forward: pending -> running -> succeeded|failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::error::StageError;
use super::event::StageEvent;
use super::stage::StageKind;
use crate::diagnostics::Warning;
use crate::types::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Running, StageStatus::Succeeded)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A stage status change the run state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition for stage {index} ({stage}): {from} -> {to}")]
pub struct IllegalTransition {
    pub index: usize,
    pub stage: StageKind,
    pub from: StageStatus,
    pub to: StageStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub kind: StageKind,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Why a run failed.
#[derive(Debug)]
pub struct RunFailure {
    pub stage_index: usize,
    pub stage: StageKind,
    pub error: StageError,
}

impl RunFailure {
    pub fn exit_code(&self) -> i32 {
        match self.error {
            StageError::Configuration { .. } => 2,
            _ => self.stage.exit_code(),
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}' failed: {}", self.stage, self.error)
    }
}

/// One execution of a pipeline. Only the orchestrator mutates it.
#[derive(Debug)]
pub struct PipelineRun {
    id: RunId,
    stages: Vec<StageRecord>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    events: Vec<StageEvent>,
    warnings: Vec<Warning>,
    failure: Option<RunFailure>,
}

impl PipelineRun {
    pub(crate) fn new(id: RunId, kinds: impl IntoIterator<Item = StageKind>) -> Self {
        Self {
            id,
            stages: kinds.into_iter().map(StageRecord::new).collect(),
            started_at: Utc::now(),
            finished_at: None,
            events: Vec::new(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.is_finished() && self.failure.is_none()
    }

    /// 0 on success, otherwise the failing stage's code.
    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, RunFailure::exit_code)
    }

    /// Move stage `index` to `to`, stamping start or end time.
    pub(crate) fn advance(
        &mut self,
        index: usize,
        to: StageStatus,
    ) -> Result<&StageRecord, IllegalTransition> {
        let record = &mut self.stages[index];
        if !record.status.can_transition_to(to) {
            return Err(IllegalTransition {
                index,
                stage: record.kind,
                from: record.status,
                to,
            });
        }

        let now = Utc::now();
        match to {
            StageStatus::Running => record.started_at = Some(now),
            _ => record.finished_at = Some(now),
        }
        record.status = to;
        Ok(record)
    }

    pub(crate) fn record_event(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    pub(crate) fn fail(&mut self, stage_index: usize, error: StageError) {
        let stage = self.stages[stage_index].kind;
        self.failure = Some(RunFailure {
            stage_index,
            stage,
            error,
        });
    }

    pub(crate) fn finish(&mut self, warnings: Vec<Warning>) {
        self.warnings = warnings;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        use StageStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn advance_stamps_times() {
        let mut run = PipelineRun::new(RunId::new("r1"), [StageKind::Test]);
        let record = run.advance(0, StageStatus::Running).unwrap();
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_none());

        let record = run.advance(0, StageStatus::Succeeded).unwrap();
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn resolved_stage_cannot_rerun() {
        let mut run = PipelineRun::new(RunId::new("r1"), [StageKind::Build]);
        run.advance(0, StageStatus::Running).unwrap();
        run.advance(0, StageStatus::Failed).unwrap();

        let err = run.advance(0, StageStatus::Running).unwrap_err();
        assert_eq!(err.from, StageStatus::Failed);
        assert_eq!(err.to, StageStatus::Running);
        assert_eq!(run.stages()[0].status, StageStatus::Failed);
    }

    #[test]
    fn unfinished_run_has_not_succeeded() {
        let run = PipelineRun::new(RunId::new("r1"), [StageKind::Test]);
        assert!(!run.succeeded());
        assert_eq!(run.exit_code(), 0);
    }
}
