use thiserror::Error;

/// Result type for rights operations.
pub type RightsResult<T> = Result<T, RightsError>;

/// Request-time rights failures. Configuration problems are a separate,
/// startup-fatal type ([`crate::RightsConfigError`]).
#[derive(Debug, Error)]
pub enum RightsError {
    /// The actor lacks the capability; deliberately carries no detail
    /// about whether the entity exists.
    #[error("not authorized")]
    Unauthorized,

    #[error("right '{right}' is capped at {cap} holder(s)")]
    LimitExceeded { right: String, cap: u32 },

    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("unknown right '{right}' on entity type '{entity_type}'")]
    UnknownRight {
        entity_type: String,
        right: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}
