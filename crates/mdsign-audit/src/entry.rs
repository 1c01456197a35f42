//! Audit entry types.
//!
//! Two things are recorded: a signature being added to an envelope, and an
//! envelope being archived just before it is deleted. Each entry carries
//! everything needed to read it on its own; the envelope it mentions may be
//! long gone.

use std::fmt;

use mdsign_core::{
    Algorithm, Envelope, EnvelopeId, HashAlgorithm, RecordId, SignatureEntry, SignerId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Record snapshot attached to a new-signature entry.
pub type RecordSnapshot = serde_json::Map<String, serde_json::Value>;

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEntry {
    /// A signer added a signature to an envelope.
    NewSignature(NewSignature),
    /// An envelope and all its entries were archived before deletion.
    Archived(ArchivedEnvelope),
}

/// Payload of [`AuditEntry::NewSignature`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignature {
    /// When the entry was written.
    pub recorded_at: Timestamp,
    /// Kind of the signed record.
    pub record_kind: String,
    /// Primary key of the signed record.
    pub record_id: RecordId,
    /// Row version that was signed.
    pub row_version: u64,
    /// Envelope the signature was added to.
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
    /// The record's canonical fields at signing time, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_snapshot: Option<RecordSnapshot>,
}

/// Payload of [`AuditEntry::Archived`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEnvelope {
    /// When the entry was written.
    pub recorded_at: Timestamp,
    /// Why the envelope was removed.
    pub reason: ArchiveReason,
    /// The envelope as it was.
    pub envelope: Envelope,
    /// All of its entries.
    pub entries: Vec<SignatureEntry>,
    /// The record's row version at archive time; `None` if it was gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_row_version: Option<u64>,
}

/// Why an envelope stopped being current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    /// The record no longer exists.
    RecordDeleted,
    /// The envelope names a kind this build does not know.
    UnknownKind,
    /// The record points at a different envelope (or none).
    NotReferenced,
    /// The record moved past the signed row version.
    VersionOutdated,
}

impl ArchiveReason {
    /// All reasons.
    pub const ALL: [Self; 4] = [
        Self::RecordDeleted,
        Self::UnknownKind,
        Self::NotReferenced,
        Self::VersionOutdated,
    ];

    /// The persisted name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordDeleted => "record_deleted",
            Self::UnknownKind => "unknown_kind",
            Self::NotReferenced => "not_referenced",
            Self::VersionOutdated => "version_outdated",
        }
    }
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditEntry {
    /// A new-signature entry for `entry`, recorded now.
    #[must_use]
    pub fn new_signature(
        envelope: &Envelope,
        entry: &SignatureEntry,
        record_snapshot: Option<RecordSnapshot>,
    ) -> Self {
        Self::NewSignature(NewSignature {
            recorded_at: Timestamp::now(),
            record_kind: envelope.record_kind.clone(),
            record_id: envelope.record_id.clone(),
            row_version: envelope.signed_row_version,
            envelope_id: envelope.id,
            signer_id: entry.signer_id,
            signature: entry.signature.clone(),
            algorithm: entry.algorithm,
            hash_algorithm: entry.hash_algorithm,
            record_snapshot,
        })
    }

    /// An archived entry for `envelope` and its `entries`, recorded now.
    #[must_use]
    pub fn archived(
        envelope: Envelope,
        entries: Vec<SignatureEntry>,
        reason: ArchiveReason,
        record_row_version: Option<u64>,
    ) -> Self {
        Self::Archived(ArchivedEnvelope {
            recorded_at: Timestamp::now(),
            reason,
            envelope,
            entries,
            record_row_version,
        })
    }

    /// When the entry was written.
    #[must_use]
    pub fn recorded_at(&self) -> Timestamp {
        match self {
            Self::NewSignature(e) => e.recorded_at,
            Self::Archived(e) => e.recorded_at,
        }
    }

    /// Kind of the record the entry is about.
    #[must_use]
    pub fn record_kind(&self) -> &str {
        match self {
            Self::NewSignature(e) => &e.record_kind,
            Self::Archived(e) => &e.envelope.record_kind,
        }
    }

    /// Primary key of the record the entry is about.
    #[must_use]
    pub fn record_id(&self) -> &RecordId {
        match self {
            Self::NewSignature(e) => &e.record_id,
            Self::Archived(e) => &e.envelope.record_id,
        }
    }

    /// Envelope the entry is about.
    #[must_use]
    pub fn envelope_id(&self) -> EnvelopeId {
        match self {
            Self::NewSignature(e) => e.envelope_id,
            Self::Archived(e) => e.envelope.id,
        }
    }

    /// Whether the entry concerns record `id` of `kind`.
    #[must_use]
    pub fn is_for_record(&self, kind: &str, id: &RecordId) -> bool {
        self.record_kind() == kind && self.record_id() == id
    }

    /// One-line human description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::NewSignature(e) => format!(
                "signer {} signed {} {} at v{}",
                e.signer_id.short(),
                e.record_kind,
                e.record_id,
                e.row_version
            ),
            Self::Archived(e) => format!(
                "archived envelope {} for {} {} (v{}, {} entries): {}",
                e.envelope.id,
                e.envelope.record_kind,
                e.envelope.record_id,
                e.envelope.signed_row_version,
                e.entries.len(),
                e.reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsign_core::RecordKind;

    fn envelope() -> Envelope {
        Envelope::new(RecordKind::Gameversions, RecordId::new("gv-1"), 2)
    }

    #[test]
    fn test_new_signature_is_tagged() {
        let envelope = envelope();
        let entry = SignatureEntry::new(envelope.id, SignerId::new(), vec![0xbe, 0xef], Algorithm::Ed25519);
        let audit = AuditEntry::new_signature(&envelope, &entry, None);

        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["type"], "new_signature");
        assert_eq!(json["signature"], "beef");
        assert_eq!(json["row_version"], 2);
        assert!(json.get("record_snapshot").is_none());

        let back: AuditEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, audit);
    }

    #[test]
    fn test_archived_carries_entries_and_reason() {
        let envelope = envelope();
        let entry = SignatureEntry::new(envelope.id, SignerId::new(), vec![1, 2], Algorithm::RsaPssSha256);
        let audit = AuditEntry::archived(
            envelope.clone(),
            vec![entry.clone()],
            ArchiveReason::VersionOutdated,
            Some(3),
        );

        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["type"], "archived");
        assert_eq!(json["reason"], "version_outdated");
        assert_eq!(json["entries"][0]["signature"], "0102");

        assert_eq!(audit.envelope_id(), envelope.id);
        assert!(audit.is_for_record("gameversions", &RecordId::new("gv-1")));
        assert!(!audit.is_for_record("attachments", &RecordId::new("gv-1")));
        assert!(audit.description().contains("version_outdated"));
    }

    #[test]
    fn test_reason_names() {
        let names: Vec<&str> = ArchiveReason::ALL.iter().map(ArchiveReason::as_str).collect();
        assert_eq!(
            names,
            ["record_deleted", "unknown_kind", "not_referenced", "version_outdated"]
        );
    }
}
