// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles pipeline names, image refs, stage lists and deploy targets.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::RemoteTarget;
use super::target::TargetEntry;
use crate::pipeline::StageKind;
use crate::types::{ImageReference, PipelineName};

pub fn deserialize_pipeline_name<'de, D>(deserializer: D) -> Result<PipelineName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    PipelineName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageReference, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageReference::parse(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref_option<'de, D>(
    deserializer: D,
) -> Result<Option<ImageReference>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| ImageReference::parse(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Stages must be non-empty, listed at most once each, and in test, build,
/// deploy order. Data dependencies are checked later by the orchestrator.
pub fn deserialize_stages<'de, D>(deserializer: D) -> Result<NonEmpty<StageKind>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let stages: Vec<StageKind> = Vec::deserialize(deserializer)?;
    for (i, stage) in stages.iter().enumerate() {
        if stages[..i].contains(stage) {
            return Err(serde::de::Error::custom(format!(
                "stage '{stage}' listed more than once"
            )));
        }
    }
    if let Some(pair) = stages.windows(2).find(|pair| pair[0] > pair[1]) {
        return Err(serde::de::Error::custom(format!(
            "stage '{}' must come before '{}'",
            pair[1], pair[0]
        )));
    }
    NonEmpty::from_vec(stages)
        .ok_or_else(|| serde::de::Error::custom("at least one stage is required"))
}

pub fn deserialize_target<'de, D>(deserializer: D) -> Result<RemoteTarget, D::Error>
where
    D: serde::Deserializer<'de>,
{
    TargetEntry::deserialize(deserializer)?
        .into_target()
        .map_err(serde::de::Error::custom)
}

pub fn deserialize_target_option<'de, D>(
    deserializer: D,
) -> Result<Option<RemoteTarget>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<TargetEntry>::deserialize(deserializer)?
        .map(|entry| entry.into_target().map_err(serde::de::Error::custom))
        .transpose()
}
