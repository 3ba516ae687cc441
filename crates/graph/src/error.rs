//! Error types for graph elaboration (§4.4).

use thiserror::Error;

/// A single violation found during the validation pass (step 7). Collected
/// non-fail-fast so a user sees every problem with a pipeline in one run,
/// matching how the rest of this workspace reports elaboration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate task name '{0}'")]
    DuplicateTaskName(String),

    #[error("task '{task}' depends on unknown task or group '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{task}' declares an empty environment variable name")]
    EmptyEnvKey { task: String },

    #[error("task '{task}' mounts undeclared resource '{resource}'")]
    UndeclaredMountResource { task: String, resource: String },

    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task '{task}' needs capability '{capability}' but no task provides it")]
    MissingCapability { task: String, capability: String },

    #[error("failed to evaluate condition on task '{task}': {source}")]
    Condition {
        task: String,
        #[source]
        source: sykli_condition::ConditionError,
    },

    #[error("pipeline failed validation with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),
}

pub type Result<T> = std::result::Result<T, GraphError>;
