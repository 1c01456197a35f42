//! Core error types.

use thiserror::Error;

/// Errors raised by the record model and canonicalizer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The record kind is not part of the kind table.
    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    /// The signature algorithm is not supported.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signer role is not recognized.
    #[error("unknown signer role: {0}")]
    UnknownRole(String),

    /// A required field is missing from a record.
    #[error("record of kind {kind} is missing field '{field}'")]
    MissingField {
        /// Kind of the record.
        kind: String,
        /// Name of the missing field.
        field: String,
    },

    /// A field holds a value of the wrong shape.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Name of the field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
