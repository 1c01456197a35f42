//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mdsign_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{EntryId, EnvelopeId, RecordId, SignerId, Timestamp};

// Records
pub use crate::{FieldValue, Record, RecordKind};

// Canonical form
pub use crate::{CanonicalForm, canonicalize};

// Envelopes and signers
pub use crate::{Algorithm, Envelope, SignatureEntry, SignerInfo, SignerRole};
