//! Error type shared by every storage backend

use crate::models::MessageId;

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced through the [`MessageStore`](crate::storage::MessageStore) contract
///
/// Backend failures are passed through as-is so the caller can decide
/// whether to retry or report them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Message not found: {id}")]
    NotFound { id: MessageId },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn not_found(id: &MessageId) -> Self {
        StoreError::NotFound { id: id.clone() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether this error means the requested message does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StoreError::Unavailable {
            message: format!("lock poisoned: {}", e),
        }
    }
}
