//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mdsign_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Keys
pub use crate::{LocalSigner, PrivateKey, PublicKey, SigningCapability};

// Keyfiles
pub use crate::{KeyEncoding, Keyfile};

// Hashing
pub use crate::ContentHash;
