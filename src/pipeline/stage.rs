// ABOUTME: Stage trait, stage kinds, and the artifacts passed between stages.
// ABOUTME: Stages declare inputs and outputs so wiring can be checked before a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::error::StageError;
use crate::credential::Credentials;
use crate::deadline::Deadline;
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::{ImageReference, RunId};

/// Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Test,
    Build,
    Deploy,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Test => "test",
            StageKind::Build => "build",
            StageKind::Deploy => "deploy",
        }
    }

    /// Process exit code when this stage fails.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageKind::Test => 10,
            StageKind::Build => 11,
            StageKind::Deploy => 12,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Image => write!(f, "an image"),
        }
    }
}

/// Something a stage produces for later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// An image pushed to the registry.
    Image(ImageReference),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Image(_) => ArtifactKind::Image,
        }
    }
}

/// Artifacts published so far in a run, one per kind.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    published: BTreeMap<ArtifactKind, Artifact>,
}

impl Artifacts {
    pub fn publish(&mut self, artifact: Artifact) {
        self.published.insert(artifact.kind(), artifact);
    }

    /// Take every artifact from `other`, replacing same-kind entries.
    pub fn merge(&mut self, other: Artifacts) {
        self.published.extend(other.published);
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.published.contains_key(&kind)
    }

    pub fn image(&self) -> Option<&ImageReference> {
        match self.published.get(&ArtifactKind::Image) {
            Some(Artifact::Image(image)) => Some(image),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }
}

/// What a stage sees while it runs.
pub struct StageContext<'a> {
    pub run_id: &'a RunId,
    pub credentials: &'a Credentials,
    pub deadline: Deadline,
    inputs: &'a Artifacts,
    outputs: Artifacts,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> StageContext<'a> {
    pub fn new(
        run_id: &'a RunId,
        credentials: &'a Credentials,
        deadline: Deadline,
        inputs: &'a Artifacts,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            run_id,
            credentials,
            deadline,
            inputs,
            outputs: Artifacts::default(),
            diagnostics,
        }
    }

    /// Artifacts published by earlier stages.
    pub fn inputs(&self) -> &Artifacts {
        self.inputs
    }

    pub fn publish(&mut self, artifact: Artifact) {
        tracing::debug!(kind = ?artifact.kind(), "artifact published");
        self.outputs.publish(artifact);
    }

    pub fn warn(&mut self, warning: Warning) {
        self.diagnostics.warn(warning);
    }

    pub(crate) fn into_outputs(self) -> Artifacts {
        self.outputs
    }
}

/// One phase of a pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Artifacts that must have been published by an earlier stage.
    fn inputs(&self) -> &[ArtifactKind] {
        &[]
    }

    /// Artifacts this stage publishes on success.
    fn outputs(&self) -> &[ArtifactKind] {
        &[]
    }

    /// Upper bound on how long `execute` may take.
    fn timeout(&self) -> Duration;

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError>;
}
