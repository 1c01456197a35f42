//! Private keys and the signing capability handed to signing operations.
//!
//! Private material never lives in the signer registry. Callers load a key
//! (usually from a keyfile), wrap it in a [`LocalSigner`] and pass it to the
//! operation that needs it.

use std::fmt;

use ed25519_dalek::SigningKey;
use mdsign_core::{Algorithm, SignerId};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::public_key::PublicKey;

use ed25519_dalek::Signer as _;
use ed25519_dalek::pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _, LineEnding};
use rsa::signature::{RandomizedSigner as _, SignatureEncoding as _};

/// Something able to sign on behalf of one signer.
///
/// Implementations must sign exactly the bytes they are given; callers pass
/// the SHA-256 digest of the canonical form.
pub trait SigningCapability: Send + Sync {
    /// The signer this capability belongs to.
    fn signer_id(&self) -> SignerId;

    /// The algorithm it signs with.
    fn algorithm(&self) -> Algorithm;

    /// The matching public key.
    fn public_key(&self) -> PublicKey;

    /// Sign `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the backend fails.
    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// A private key of either supported algorithm.
///
/// Both variants zeroize their secret material on drop.
pub enum PrivateKey {
    /// Ed25519 signing key.
    Ed25519(SigningKey),
    /// RSA private key, used with PSS padding and SHA-256.
    Rsa(Box<RsaPrivateKey>),
}

/// RSA modulus size used by [`PrivateKey::generate`].
pub const DEFAULT_RSA_BITS: usize = 2048;

impl PrivateKey {
    /// Generate a fresh key for `algorithm` using the OS RNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if RSA generation fails.
    pub fn generate(algorithm: Algorithm) -> CryptoResult<Self> {
        match algorithm {
            Algorithm::Ed25519 => Ok(Self::Ed25519(SigningKey::generate(&mut OsRng))),
            Algorithm::RsaPssSha256 => Self::generate_rsa(DEFAULT_RSA_BITS),
        }
    }

    /// Generate an RSA key with a `bits`-bit modulus.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if generation fails.
    pub fn generate_rsa(bits: usize) -> CryptoResult<Self> {
        RsaPrivateKey::new(&mut OsRng, bits)
            .map(|key| Self::Rsa(Box::new(key)))
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("rsa keygen: {e}")))
    }

    /// Parse a PKCS#8 DER private key for `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if the DER does not hold a
    /// key of that algorithm.
    pub fn from_pkcs8_der(algorithm: Algorithm, der: &[u8]) -> CryptoResult<Self> {
        match algorithm {
            Algorithm::Ed25519 => SigningKey::from_pkcs8_der(der)
                .map(Self::Ed25519)
                .map_err(|e| CryptoError::InvalidPrivateKey(format!("ed25519 pkcs8: {e}"))),
            Algorithm::RsaPssSha256 => RsaPrivateKey::from_pkcs8_der(der)
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::InvalidPrivateKey(format!("rsa pkcs8: {e}"))),
        }
    }

    /// Parse a PEM private key for `algorithm`.
    ///
    /// PKCS#8 (`BEGIN PRIVATE KEY`) is accepted for both algorithms; RSA keys
    /// may also be PKCS#1 (`BEGIN RSA PRIVATE KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if the PEM does not parse.
    pub fn from_pem(algorithm: Algorithm, pem: &str) -> CryptoResult<Self> {
        let pem = pem.trim();
        match algorithm {
            Algorithm::Ed25519 => SigningKey::from_pkcs8_pem(pem)
                .map(Self::Ed25519)
                .map_err(|e| CryptoError::InvalidPrivateKey(format!("ed25519 pem: {e}"))),
            Algorithm::RsaPssSha256 => RsaPrivateKey::from_pkcs8_pem(pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::InvalidPrivateKey(format!("rsa pem: {e}"))),
        }
    }

    /// Parse a hex private key for `algorithm`.
    ///
    /// The hex is PKCS#8 DER; for Ed25519 a bare 32-byte seed is also
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHexEncoding`] or
    /// [`CryptoError::InvalidPrivateKey`].
    pub fn from_hex(algorithm: Algorithm, s: &str) -> CryptoResult<Self> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHexEncoding)?,
        );
        if algorithm == Algorithm::Ed25519
            && let Ok(seed) = <[u8; 32]>::try_from(bytes.as_slice())
        {
            let seed = Zeroizing::new(seed);
            return Ok(Self::Ed25519(SigningKey::from_bytes(&seed)));
        }
        Self::from_pkcs8_der(algorithm, &bytes)
    }

    /// The algorithm of this key.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::Rsa(_) => Algorithm::RsaPssSha256,
        }
    }

    /// The matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            Self::Rsa(key) => PublicKey::Rsa(Box::new(key.to_public_key())),
        }
    }

    /// Sign `message`.
    ///
    /// Ed25519 signs the bytes directly. RSA uses PSS with SHA-256 and a
    /// 32-byte salt.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the RSA backend fails.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        match self {
            Self::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
            Self::Rsa(key) => {
                let signing_key = rsa::pss::SigningKey::<Sha256>::new((**key).clone());
                signing_key
                    .try_sign_with_rng(&mut OsRng, message)
                    .map(|sig| sig.to_vec())
                    .map_err(|e| CryptoError::SigningFailed(e.to_string()))
            },
        }
    }

    /// PKCS#8 DER encoding (careful - sensitive!).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if encoding fails.
    pub fn to_pkcs8_der(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let doc = match self {
            Self::Ed25519(key) => key
                .to_pkcs8_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?,
            Self::Rsa(key) => key
                .to_pkcs8_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?,
        };
        Ok(Zeroizing::new(doc))
    }

    /// PKCS#8 PEM encoding (careful - sensitive!).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPrivateKey`] if encoding fails.
    pub fn to_pkcs8_pem(&self) -> CryptoResult<Zeroizing<String>> {
        match self {
            Self::Ed25519(key) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string())),
            Self::Rsa(key) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string())),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.public_key().key_id_hex())
            .finish_non_exhaustive()
    }
}

/// A signer whose private key is held in process memory.
pub struct LocalSigner {
    signer_id: SignerId,
    key: PrivateKey,
}

impl LocalSigner {
    /// Pair a signer ID with its private key.
    #[must_use]
    pub fn new(signer_id: SignerId, key: PrivateKey) -> Self {
        Self { signer_id, key }
    }

    /// Borrow the private key.
    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl SigningCapability for LocalSigner {
    fn signer_id(&self) -> SignerId {
        self.signer_id
    }

    fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        self.key.sign(message)
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("signer_id", &self.signer_id)
            .field("algorithm", &self.key.algorithm())
            .finish_non_exhaustive()
    }
}
