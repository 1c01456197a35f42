//! Runtime error types.

use mdsign_core::{EnvelopeId, RecordId, RecordKind, SignerId, SignerRole};
use thiserror::Error;

/// Errors that can occur in the signing runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The record does not exist.
    #[error("Record not found: {kind} {record_id}")]
    RecordNotFound {
        /// Record kind.
        kind: RecordKind,
        /// Record primary key.
        record_id: RecordId,
    },

    /// The signer is not registered.
    #[error("Signer not found: {0}")]
    SignerNotFound(SignerId),

    /// A signer with this ID is already registered.
    #[error("Signer already registered: {0}")]
    SignerExists(SignerId),

    /// A signing capability does not match its registered signer.
    #[error("Signing key does not match registered signer {signer_id}: {reason}")]
    CapabilityMismatch {
        /// The signer.
        signer_id: SignerId,
        /// What disagrees.
        reason: String,
    },

    /// The signer is registered with a different role.
    #[error("Signer {signer_id} has role {actual}, expected {expected}")]
    WrongRole {
        /// The signer.
        signer_id: SignerId,
        /// Required role.
        expected: SignerRole,
        /// Registered role.
        actual: SignerRole,
    },

    /// The record kept changing under every attempt.
    #[error("Gave up on {kind} {record_id} after {attempts} attempts: row version kept moving")]
    Contention {
        /// Record kind.
        kind: RecordKind,
        /// Record primary key.
        record_id: RecordId,
        /// Attempts made.
        attempts: u32,
    },

    /// An envelope disappeared while it was being used.
    #[error("Envelope not found: {0}")]
    EnvelopeNotFound(EnvelopeId),

    /// Response payload is not signable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Core model error.
    #[error("Model error: {0}")]
    CoreError(#[from] mdsign_core::CoreError),

    /// Crypto error.
    #[error("Crypto error: {0}")]
    CryptoError(#[from] mdsign_crypto::CryptoError),

    /// Storage error.
    #[error("Storage error: {0}")]
    StorageError(#[from] mdsign_storage::StorageError),

    /// Audit error.
    #[error("Audit error: {0}")]
    AuditError(#[from] mdsign_audit::AuditError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
