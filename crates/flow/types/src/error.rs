use crate::ActionSetId;
use rights_types::RightsError;
use thiserror::Error;

/// Result type for workflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Workflow-level failures. All of these are expected business results
/// recovered at the operation boundary — nothing here crosses the
/// builder/lifecycle extension boundary as a panic.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The caller lacks the required right. Also returned for missing
    /// actionsets so existence is never leaked to unauthorized callers.
    #[error("not authorized")]
    Unauthorized,

    #[error("action index {index} out of bounds for {len} action(s)")]
    InvalidIndex { index: usize, len: usize },

    /// Every action is terminal and no explicit index was given
    #[error("no editable action remains")]
    NoEditableAction,

    /// The addressed action exists but cannot be edited in its current
    /// kind or status
    #[error("action {index} cannot be edited")]
    NotEditable { index: usize },

    /// Mutation attempted on a finished workflow. Idempotency boundary,
    /// not a transient failure — callers must not retry.
    #[error("actionset {0} is already consumed")]
    AlreadyConsumed(ActionSetId),

    /// No builder/lifecycle pair registered under this name. A
    /// configuration problem: registries are populated at process start.
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    /// A builder violated its contract or reported a build failure
    #[error("builder error: {0}")]
    Builder(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RightsError> for FlowError {
    fn from(err: RightsError) -> Self {
        match err {
            RightsError::Unauthorized => FlowError::Unauthorized,
            RightsError::Storage(message) => FlowError::Storage(message),
            // Unknown entity types or rights reaching the flow engine
            // mean a builder declared a right the config does not know.
            other => FlowError::Configuration(other.to_string()),
        }
    }
}
