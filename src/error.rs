//! Error types for event sources and dashboard operations.

use thiserror::Error;

/// Errors reported by an event source.
///
/// These cross the source boundary, so they are cheap to clone and carry
/// only strings.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Subscription dropped")]
    SubscriptionDropped,
}

/// Main error type for dashboard, catalog and registration operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Viewing identity is missing its {0}")]
    MissingIdentity(&'static str),

    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Dashboard is closed")]
    Closed,
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        BoardError::Serialization(e.to_string())
    }
}

/// Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, BoardError>;
