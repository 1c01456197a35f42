//! Signature envelopes and their per-signer entries.
//!
//! An envelope says "this record was signed at this row version". Entries
//! hang off exactly one envelope, at most one per signer, and are removed
//! only together with it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::kind::RecordKind;
use crate::record::Record;
use crate::signer::{Algorithm, HashAlgorithm};
use crate::types::{EntryId, EnvelopeId, RecordId, SignerId, Timestamp};

/// What the signers attested to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedAction {
    /// The record content as it stands.
    #[default]
    Upsert,
    /// Removal of the record.
    Delete,
}

impl SignedAction {
    /// The persisted name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SignedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignedAction {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            _ => Err(CoreError::InvalidField {
                field: "signed_action".to_owned(),
                reason: format!("unknown action '{s}'"),
            }),
        }
    }
}

/// A signature envelope (signature list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope ID.
    pub id: EnvelopeId,
    /// Kind of the signed record, as persisted.
    ///
    /// Kept as a string: storage may hold envelopes for kinds this build
    /// no longer knows, and the sweeper must still be able to load them.
    pub record_kind: String,
    /// Primary key of the signed record.
    pub record_id: RecordId,
    /// Row version the signatures cover.
    pub signed_row_version: u64,
    /// Action tag.
    #[serde(default)]
    pub action: SignedAction,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Envelope {
    /// A new upsert envelope for `record_id` at `version`.
    #[must_use]
    pub fn new(kind: RecordKind, record_id: RecordId, version: u64) -> Self {
        Self {
            id: EnvelopeId::new(),
            record_kind: kind.as_str().to_owned(),
            record_id,
            signed_row_version: version,
            action: SignedAction::Upsert,
            created_at: Timestamp::now(),
        }
    }

    /// The record kind, if it is one this build knows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::UnknownKind`] otherwise.
    pub fn kind(&self) -> CoreResult<RecordKind> {
        RecordKind::parse(&self.record_kind)
    }

    /// Whether this envelope is the current one for `record`: the record
    /// points at it and the version has not moved since signing.
    ///
    /// # Errors
    ///
    /// Returns an error if the record's reference or version field is
    /// malformed.
    pub fn is_current_for(&self, record: &Record) -> CoreResult<bool> {
        Ok(record.reference()? == Some(self.id) && record.row_version()? == self.signed_row_version)
    }
}

/// One signer's signature inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Entry ID.
    pub id: EntryId,
    /// Owning envelope.
    pub envelope_id: EnvelopeId,
    /// Who signed.
    pub signer_id: SignerId,
    /// Signature bytes (hex on the wire).
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Signature algorithm.
    pub algorithm: Algorithm,
    /// Hash applied before signing.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// When the signature was made (or last replaced).
    pub signed_at: Timestamp,
}

impl SignatureEntry {
    /// A new SHA-256 entry signed now.
    #[must_use]
    pub fn new(
        envelope_id: EnvelopeId,
        signer_id: SignerId,
        signature: Vec<u8>,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            id: EntryId::new(),
            envelope_id,
            signer_id,
            signature,
            algorithm,
            hash_algorithm: HashAlgorithm::Sha256,
            signed_at: Timestamp::now(),
        }
    }

    /// Signature as lowercase hex.
    #[must_use]
    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}
