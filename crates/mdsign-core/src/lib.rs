//! mdsign Core - Record model and canonical serialization.
//!
//! This crate provides:
//! - Identifier and timestamp types
//! - The versioned table of signable record kinds
//! - Records and field values
//! - Canonical serialization of records for signing
//! - Envelope, entry and signer types
//!
//! # Example
//!
//! ```
//! use mdsign_core::{Envelope, Record, RecordKind, canonicalize};
//!
//! let mut record = Record::new(RecordKind::Rhpatches, "patch-1")
//!     .with("name", "Kaizo Demo");
//!
//! let envelope = Envelope::new(RecordKind::Rhpatches, record.id().unwrap(), 1);
//! record.set_reference(Some(envelope.id));
//! assert!(envelope.is_current_for(&record).unwrap());
//!
//! // The reference field never takes part in the canonical form.
//! assert!(!canonicalize(&record).as_str().contains("siglistuuid"));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod canonical;
mod envelope;
mod error;
mod kind;
mod record;
mod signer;
mod types;

pub use canonical::{CanonicalForm, canonicalize, canonicalize_fields, clean_snapshot};
pub use envelope::{Envelope, SignatureEntry, SignedAction};
pub use error::{CoreError, CoreResult};
pub use kind::{
    CANONICAL_FORMAT_VERSION, CoveredPayload, Database, KindSpec, REFERENCE_FIELD, RecordKind,
    SIGNATURE_ARTIFACT_FIELDS, VERSION_FIELD,
};
pub use record::{FieldValue, Record};
pub use signer::{Algorithm, HashAlgorithm, SignerInfo, SignerRole};
pub use types::{EntryId, EnvelopeId, RecordId, SignerId, Timestamp};
