//! mdsign Runtime - signing, rotation, cleanup and response signatures.
//!
//! This crate provides:
//! - A signer registry over the `signers` table
//! - The envelope lifecycle: create, reuse, rotate on a version bump
//! - Record signing with retry when the record moves underneath
//! - Verification of every entry on a record's current envelope
//! - A cleanup sweeper for orphaned and outdated envelopes
//! - Signed API responses
//!
//! # Architecture
//!
//! Every component works over one [`SignatureStore`] and one
//! [`AuditLog`]. A record points at its current envelope through a
//! reference field; moving that reference is a single compare-and-set in
//! storage, so concurrent signers converge on one envelope per version.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mdsign_audit::AuditLog;
//! use mdsign_core::{Record, RecordId, RecordKind, SignerId, SignerRole};
//! use mdsign_crypto::{LocalSigner, PrivateKey};
//! use mdsign_runtime::{RuntimeConfig, SignatureRuntime};
//! use mdsign_storage::{MemoryStore, RecordStore};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::shared();
//! store.insert_record(&Record::new(RecordKind::Gameversions, "gv-1").with("name", "Demo"))?;
//!
//! let runtime = SignatureRuntime::new(
//!     store,
//!     Arc::new(AuditLog::in_memory()),
//!     RuntimeConfig::default(),
//! );
//!
//! let key = LocalSigner::new(SignerId::new(), PrivateKey::generate(mdsign_core::Algorithm::Ed25519)?);
//! runtime.registry().register_capability(&key, "metadata-bot", SignerRole::Content)?;
//!
//! let id = RecordId::new("gv-1");
//! let outcome = runtime.sign_record(RecordKind::Gameversions, &id, &key)?;
//! assert_eq!(outcome.status(), "signed");
//! assert!(runtime.verify_record(RecordKind::Gameversions, &id)?.all_valid());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! [`SignatureStore`]: mdsign_storage::SignatureStore
//! [`AuditLog`]: mdsign_audit::AuditLog

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod prelude;

mod error;
mod lifecycle;
mod registry;
mod response;
mod runtime;
mod signing;
mod sweeper;
mod verify;

pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{AddOutcome, CurrentEnvelope, EnsureOutcome, LifecycleManager, Removal};
pub use registry::SignerRegistry;
pub use response::{
    RECORD_SIGNATURES_FIELD, ResponseSigner, SERVER_SIGNATURE_FIELD, TIMESTAMP_FIELD,
    record_signatures_key, response_digest,
};
pub use runtime::{DEFAULT_MAX_ATTEMPTS, RuntimeConfig, SignatureRuntime};
pub use signing::{RecordSigner, SignAllReport, SignFailure, SignOutcome};
pub use sweeper::{SweepReport, Sweeper, Verdict};
pub use verify::{EntryVerification, RecordVerification, Verifier};
