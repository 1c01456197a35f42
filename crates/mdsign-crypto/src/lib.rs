//! mdsign Crypto - Keys, signing and hashing for record signatures.
//!
//! This crate provides:
//! - SHA-256 content hashing (the digest every signer signs)
//! - Ed25519 and RSA-PSS/SHA-256 public and private keys
//! - The [`SigningCapability`] handed to signing operations
//! - Signer keyfile parsing and rendering
//!
//! # Example
//!
//! ```
//! use mdsign_core::{Algorithm, SignerId};
//! use mdsign_crypto::{ContentHash, LocalSigner, PrivateKey, SigningCapability};
//!
//! let key = PrivateKey::generate(Algorithm::Ed25519).unwrap();
//! let signer = LocalSigner::new(SignerId::new(), key);
//!
//! let digest = ContentHash::hash(b"gvuuid=gv-1&row_version=1");
//! let signature = signer.sign(digest.as_bytes()).unwrap();
//!
//! assert!(signer.public_key().verify(digest.as_bytes(), &signature).is_ok());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keyfile;
mod public_key;
mod signing;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keyfile::{KeyEncoding, Keyfile};
pub use public_key::PublicKey;
pub use signing::{DEFAULT_RSA_BITS, LocalSigner, PrivateKey, SigningCapability};
