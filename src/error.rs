use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "unknown stage identifier(s): {}. Known stages: {}",
        .identifiers.join(", "),
        .known.join(", ")
    )]
    UnknownStages {
        identifiers: Vec<String>,
        known: Vec<String>,
    },
    #[error("duplicate stage key '{0}' in registry")]
    DuplicateStageKey(String),
    #[error(
        "stage '{stage}' requires '{requirement}', which is not declared earlier in the registry"
    )]
    UnknownRequirement { stage: String, requirement: String },
}

#[derive(Debug, Error)]
#[error("stage '{key}' failed: {source}")]
pub struct StageError {
    pub key: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("stage '{key}' is missing prerequisite output(s): {}", .missing.join(", "))]
pub struct MissingPrerequisite {
    pub key: String,
    pub missing: Vec<String>,
}
