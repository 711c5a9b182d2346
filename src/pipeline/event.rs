// ABOUTME: Structured stage events and the sinks that receive them.
// ABOUTME: The tracing sink is always installed; callers may add more.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StageErrorKind;
use super::run::StageStatus;
use super::stage::StageKind;
use crate::types::RunId;

/// Emitted on every stage status change.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub run_id: RunId,
    pub stage_index: usize,
    pub stage: StageKind,
    pub status: StageStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<StageErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &StageEvent);
}

/// Logs stage events with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &StageEvent) {
        match event.status {
            StageStatus::Failed => tracing::error!(
                run_id = %event.run_id,
                stage = %event.stage,
                index = event.stage_index,
                duration_ms = event.duration_ms,
                error_kind = ?event.error_kind,
                error = event.error.as_deref().unwrap_or(""),
                "stage failed"
            ),
            status => tracing::info!(
                run_id = %event.run_id,
                stage = %event.stage,
                index = event.stage_index,
                duration_ms = event.duration_ms,
                "stage {}", status
            ),
        }
    }
}
