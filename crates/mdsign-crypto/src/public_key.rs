//! Public keys for both supported algorithms.

use std::fmt;

use ed25519_dalek::VerifyingKey;
use mdsign_core::Algorithm;
use rsa::RsaPublicKey;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;

use ed25519_dalek::Verifier as _;
use ed25519_dalek::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};
use rsa::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};
use rsa::signature::Verifier as _;

/// A signer's public key.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 verifying key.
    Ed25519(VerifyingKey),
    /// RSA public key, used with PSS padding and SHA-256.
    Rsa(Box<RsaPublicKey>),
}

impl PublicKey {
    /// Parse public key bytes for `algorithm`.
    ///
    /// Accepts SPKI DER for both algorithms, and additionally the raw
    /// 32-byte key for Ed25519.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not parse
    /// as a key of that algorithm.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> CryptoResult<Self> {
        match algorithm {
            Algorithm::Ed25519 => {
                if let Ok(raw) = <[u8; 32]>::try_from(bytes) {
                    return VerifyingKey::from_bytes(&raw)
                        .map(Self::Ed25519)
                        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()));
                }
                VerifyingKey::from_public_key_der(bytes)
                    .map(Self::Ed25519)
                    .map_err(|e| CryptoError::InvalidPublicKey(format!("ed25519 spki: {e}")))
            },
            Algorithm::RsaPssSha256 => RsaPublicKey::from_public_key_der(bytes)
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::InvalidPublicKey(format!("rsa spki: {e}"))),
        }
    }

    /// Parse hex-encoded public key bytes for `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHexEncoding`] or
    /// [`CryptoError::InvalidPublicKey`].
    pub fn from_hex(algorithm: Algorithm, s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHexEncoding)?;
        Self::from_bytes(algorithm, &bytes)
    }

    /// The algorithm this key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::Rsa(_) => Algorithm::RsaPssSha256,
        }
    }

    /// SPKI DER encoding, the form stored in the signer registry.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if encoding fails.
    pub fn to_spki_der(&self) -> CryptoResult<Vec<u8>> {
        match self {
            Self::Ed25519(key) => key
                .to_public_key_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string())),
            Self::Rsa(key) => key
                .to_public_key_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string())),
        }
    }

    /// SPKI DER as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if encoding fails.
    pub fn to_hex(&self) -> CryptoResult<String> {
        self.to_spki_der().map(hex::encode)
    }

    /// Short fingerprint: first 8 bytes of the SHA-256 of the SPKI encoding.
    ///
    /// Useful for identifying keys in logs without printing the whole key.
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        self.to_spki_der()
            .map(|der| hex::encode(&ContentHash::hash(&der).as_bytes()[..8]))
            .unwrap_or_else(|_| "unknown".to_owned())
    }

    /// Verify `signature` over `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] if the signature
    /// is malformed or does not verify.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        match self {
            Self::Ed25519(key) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)?;
                key.verify(message, &sig)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)
            },
            Self::Rsa(key) => {
                let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new((**key).clone());
                let sig = rsa::pss::Signature::try_from(signature)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)
            },
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.key_id_hex())
            .finish()
    }
}
