//! Error types for the LiftLog persistence core.

use crate::reference::ReferenceReport;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// Row-level validation problems are not errors: they are reported as
/// [`crate::transfer::RowIssue`] values next to the rows that did import.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error outside of a commit.
    #[error("storage error: {0}")]
    Storage(#[from] liftlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The schema could not be created or upgraded. The store is unusable.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the failure.
        message: String,
    },

    /// The commit log is damaged.
    #[error("commit log corruption: {message}")]
    Corruption {
        /// Description of the damage.
        message: String,
    },

    /// No record with the given key exists.
    #[error("{collection} record not found: {key}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// The missing key.
        key: String,
    },

    /// A record with the given key already exists.
    #[error("{collection} record already exists: {key}")]
    DuplicateKey {
        /// Collection written to.
        collection: String,
        /// The colliding key.
        key: String,
    },

    /// A file or payload could not be understood.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// What was wrong with the input.
        message: String,
    },

    /// An exercise is still referenced by plans or logged sets.
    #[error("exercise {} is still referenced by {} plan(s) and {} logged set(s)", .0.exercise_id, .0.plan_count, .0.logged_set_count)]
    ReferenceConflict(Box<ReferenceReport>),

    /// The storage transaction failed and nothing from it was applied.
    #[error("transaction failed: {reason}")]
    TransactionFailure {
        /// Reason reported by the storage layer.
        reason: String,
    },

    /// The connection was terminated underneath the store.
    #[error("store connection lost; reopen the store")]
    ConnectionLost,

    /// The store was closed.
    #[error("store is closed")]
    StoreClosed,

    /// Another connection holds the store and did not release it in time.
    #[error("store is blocked by another open connection")]
    Blocked,

    /// Every row was filtered out before writing.
    #[error("No rows remain after duplicate filtering.")]
    NothingToImport,

    /// Undo was requested for an import that cannot be undone.
    #[error("undo unavailable: {reason}")]
    UndoUnavailable {
        /// Why the import cannot be undone.
        reason: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a commit log corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Creates a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Creates a transaction failure.
    pub fn transaction_failure(reason: impl Into<String>) -> Self {
        Self::TransactionFailure {
            reason: reason.into(),
        }
    }

    /// Creates an undo unavailable error.
    pub fn undo_unavailable(reason: impl Into<String>) -> Self {
        Self::UndoUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true when the error means the cached store handle is dead.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionLost => true,
            Self::Storage(e) => e.is_closed(),
            _ => false,
        }
    }

    /// Returns true for errors that leave the store unusable until reload.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::Corruption { .. })
    }

    /// Short next-step hint suitable for showing next to the message.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Schema { .. } | Self::Corruption { .. } => {
                "reload the application; if it persists, open the console and copy the error"
            }
            Self::MalformedInput { .. } => "check that the file was exported by LiftLog",
            Self::NothingToImport => "every row is already in the store",
            Self::ReferenceConflict(_) => "remove the exercise from its plans and sessions first",
            Self::ConnectionLost | Self::StoreClosed | Self::Blocked => {
                "close other tabs or windows using the store and retry"
            }
            Self::TransactionFailure { .. } | Self::Storage(_) | Self::Io(_) => {
                "retry; if it persists, free some storage space"
            }
            _ => "open the console and copy the error",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_record() {
        let err = CoreError::not_found("sessions", "S1");
        assert_eq!(err.to_string(), "sessions record not found: S1");

        let err = CoreError::duplicate_key("plans", "P1");
        assert_eq!(err.to_string(), "plans record already exists: P1");
    }

    #[test]
    fn empty_import_message_is_stable() {
        assert_eq!(
            CoreError::NothingToImport.to_string(),
            "No rows remain after duplicate filtering."
        );
    }

    #[test]
    fn closed_storage_counts_as_lost_connection() {
        let err = CoreError::from(liftlog_storage::StorageError::Closed);
        assert!(err.is_connection_lost());
        assert!(!CoreError::StoreClosed.is_connection_lost());
    }

    #[test]
    fn schema_errors_are_fatal() {
        assert!(CoreError::schema("migration 3 failed").is_fatal());
        assert!(!CoreError::malformed("bad").is_fatal());
    }
}
