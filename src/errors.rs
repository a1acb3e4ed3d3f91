use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by a remote store gateway implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend rejected request: {0}")]
    Backend(String),

    #[error("Row not found: {0}")]
    RowNotFound(Uuid),

    #[error("Malformed row: {0}")]
    MalformedRow(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

/// Errors surfaced at the mutator boundary of the aggregator and workflow
/// services. Remote-call failures are caught here and never propagate into
/// rendering code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::StoreError(StoreError::Serialization(err))
    }
}
