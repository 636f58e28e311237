// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage error type.

use std::io;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedded database error
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage not initialized
    #[error("Storage not initialized")]
    NotInitialized,

    /// Reference string with an unknown scheme, or used with the wrong store
    #[error("Invalid storage reference: {0}")]
    InvalidReference(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Cannot {action} a submission that is {state}")]
    InvalidStateTransition { action: &'static str, state: String },

    /// Permission denied (ownership check failed)
    #[error("Permission denied: user {user_id} cannot access {resource}")]
    PermissionDenied { user_id: String, resource: String },

    /// Operation exceeded the configured storage timeout
    #[error("Storage operation timed out: {0}")]
    Timeout(&'static str),

    /// Blocking task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

macro_rules! database_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(e: $ty) -> Self {
                    StorageError::Database(e.to_string())
                }
            }
        )*
    };
}

database_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
