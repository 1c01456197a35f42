//! Cryptographic error types.

use mdsign_core::{Algorithm, CoreError};
use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Invalid public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid private key.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Key material does not belong to the expected algorithm.
    #[error("algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch {
        /// Algorithm that was required.
        expected: Algorithm,
        /// Algorithm that was supplied.
        actual: Algorithm,
    },

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// The signing backend refused to sign.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Invalid hex encoding.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// Keyfile could not be parsed.
    #[error("malformed keyfile: {0}")]
    MalformedKeyfile(String),

    /// I/O error (e.g. reading key files).
    #[error("I/O error: {0}")]
    IoError(String),

    /// Core model error (unknown algorithm or role name).
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
