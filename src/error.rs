//! Error types for memtier-core.

use thiserror::Error;

/// Result type alias using memtier-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during memory engine operations.
///
/// Per-record sweep failures are not raised through this type; they are
/// collected into [`crate::scheduler::SweepReport`] so a sweep always runs
/// to completion.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown record or owner
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Input rejected at the ingestion boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preference learning feedback failed
    #[error("Learning feedback error: {0}")]
    LearningFeedback(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for a record or owner.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a learning feedback error.
    pub fn learning_feedback(message: impl Into<String>) -> Self {
        Self::LearningFeedback(message.into())
    }

    /// Whether this error is a recoverable not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
