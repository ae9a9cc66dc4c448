//! Error types for directory operations.
//!
//! Directory errors never cross an orchestrator boundary: every call site
//! catches them, logs them and turns them into a skipped or failed item.

use crate::record::{EntityKind, RecordId};
use thiserror::Error;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors returned by a [`Directory`](crate::Directory) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The directory could not be reached or the call timed out.
    #[error("Directory transport failed: {operation}: {message}")]
    Transport {
        /// The operation that failed (e.g., "filter", "bulk_create").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The directory rejected a payload.
    #[error("Validation failed for {kind}: {message}")]
    Validation {
        /// Entity kind of the rejected payload.
        kind: EntityKind,
        /// Error message.
        message: String,
    },

    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Record identifier.
        id: RecordId,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict for {kind}: {message}")]
    Conflict {
        /// Entity kind.
        kind: EntityKind,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl DirectoryError {
    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: EntityKind, id: RecordId) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a conflict error.
    pub fn conflict(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Transport { .. })
    }
}
