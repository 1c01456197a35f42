//! Storage error types.

use mdsign_core::CoreError;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record, envelope or entry was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row with the same key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Connection to the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored row does not fit the record model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
