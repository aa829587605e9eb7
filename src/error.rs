//! Error types for the outbox core.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutboxError {
    /// Surfaced from the host transport's `send()`. Retryable only when the
    /// record's retry policy matcher accepts it.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Programmer misuse, raised synchronously and never retried.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Storage error: {0}")]
    Storage(String),
    /// Raised when a registered regenerate factory is missing or fails.
    #[error("Factory error: {0}")]
    Factory(String),
}

impl From<serde_json::Error> for OutboxError {
    fn from(error: serde_json::Error) -> Self {
        OutboxError::Serialization(format!("JSON error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, OutboxError>;
