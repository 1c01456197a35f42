//! Record verification.

use std::sync::Arc;

use mdsign_core::{Algorithm, Envelope, RecordId, RecordKind, SignerId, Timestamp, canonicalize};
use mdsign_crypto::ContentHash;
use mdsign_storage::{EnvelopeStore, RecordStore, SignatureStore};
use serde::Serialize;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::SignerRegistry;

/// Verification result for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryVerification {
    /// Who signed.
    pub signer_id: SignerId,
    /// Registered name, if the signer is known.
    pub signer_name: Option<String>,
    /// Claimed algorithm.
    pub algorithm: Algorithm,
    /// When the entry was written.
    pub signed_at: Timestamp,
    /// Whether the signature verifies over the current digest.
    pub valid: bool,
    /// Why it does not, when it does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Verification result for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordVerification {
    /// Record kind.
    pub kind: RecordKind,
    /// Record primary key.
    pub record_id: RecordId,
    /// Current row version.
    pub row_version: u64,
    /// SHA-256 of the current canonical form.
    pub digest: ContentHash,
    /// The envelope the record references, if it exists.
    pub envelope: Option<Envelope>,
    /// Whether that envelope is current.
    pub current: bool,
    /// Per-entry results.
    pub entries: Vec<EntryVerification>,
}

impl RecordVerification {
    /// A current envelope with at least one entry, all of which verify.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.envelope.is_some()
            && self.current
            && !self.entries.is_empty()
            && self.entries.iter().all(|e| e.valid)
    }
}

/// Checks stored signatures against the registry.
#[derive(Clone)]
pub struct Verifier {
    store: Arc<dyn SignatureStore>,
    registry: SignerRegistry,
}

impl Verifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>, registry: SignerRegistry) -> Self {
        Self { store, registry }
    }

    /// Verify every entry of the record's envelope against its current
    /// canonical digest.
    ///
    /// Entries of a stale envelope are still checked, against the current
    /// digest, so they will normally fail.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RecordNotFound`] or a store error.
    pub fn verify_record(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
    ) -> RuntimeResult<RecordVerification> {
        let record = self.store.get_record(kind, record_id)?.ok_or_else(|| {
            RuntimeError::RecordNotFound {
                kind,
                record_id: record_id.clone(),
            }
        })?;
        let digest = ContentHash::hash(canonicalize(&record).as_bytes());

        let envelope = match record.reference()? {
            Some(id) => self.store.get_envelope(id)?,
            None => None,
        };
        let current = match &envelope {
            Some(envelope) => envelope.is_current_for(&record)?,
            None => false,
        };

        let mut entries = Vec::new();
        if let Some(envelope) = &envelope {
            for entry in self.store.list_entries(envelope.id)? {
                let (signer_name, valid, problem) = match self.registry.find(entry.signer_id)? {
                    None => (None, false, Some("unknown signer".to_owned())),
                    Some(info) => {
                        let valid = self.registry.verify(
                            entry.signer_id,
                            digest.as_bytes(),
                            &entry.signature,
                            entry.algorithm,
                        )?;
                        let problem = (!valid).then(|| "signature does not verify".to_owned());
                        (Some(info.name), valid, problem)
                    },
                };
                entries.push(EntryVerification {
                    signer_id: entry.signer_id,
                    signer_name,
                    algorithm: entry.algorithm,
                    signed_at: entry.signed_at,
                    valid,
                    problem,
                });
            }
        }

        debug!(
            %kind,
            %record_id,
            current,
            entries = entries.len(),
            "Verified record"
        );
        Ok(RecordVerification {
            kind,
            record_id: record_id.clone(),
            row_version: record.row_version()?,
            digest,
            envelope,
            current,
            entries,
        })
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleManager;
    use crate::signing::RecordSigner;
    use mdsign_audit::AuditLog;
    use mdsign_core::{Record, SignerRole};
    use mdsign_storage::MemoryStore;
    use mdsign_test::ed25519_signer;

    fn setup() -> (Arc<MemoryStore>, SignerRegistry, RecordSigner, Verifier) {
        let store = MemoryStore::shared();
        let registry = SignerRegistry::new(store.clone());
        let lifecycle = LifecycleManager::new(store.clone(), Arc::new(AuditLog::in_memory()), 3);
        let signer = RecordSigner::new(store.clone(), registry.clone(), lifecycle, 3);
        let verifier = Verifier::new(store.clone(), registry.clone());
        store
            .insert_record(
                &Record::new(RecordKind::Attachments, "a-1")
                    .with("file_name", "readme.txt")
                    .with("file_hash_sha256", "ab12"),
            )
            .unwrap();
        (store, registry, signer, verifier)
    }

    #[test]
    fn test_unsigned_record() {
        let (_, _, _, verifier) = setup();
        let report = verifier
            .verify_record(RecordKind::Attachments, &RecordId::new("a-1"))
            .unwrap();
        assert!(report.envelope.is_none());
        assert!(!report.current);
        assert!(!report.all_valid());
    }

    #[test]
    fn test_signed_record_verifies_until_mutated() {
        let (store, registry, signer, verifier) = setup();
        let key = ed25519_signer();
        registry
            .register_capability(&key, "content", SignerRole::Content)
            .unwrap();
        let id = RecordId::new("a-1");
        signer.sign_record(RecordKind::Attachments, &id, &key).unwrap();

        let report = verifier.verify_record(RecordKind::Attachments, &id).unwrap();
        assert!(report.all_valid());
        assert_eq!(report.entries[0].signer_name.as_deref(), Some("content"));

        store
            .update_record(
                &Record::new(RecordKind::Attachments, "a-1")
                    .with("file_name", "renamed.txt")
                    .with("file_hash_sha256", "ab12"),
            )
            .unwrap();
        let stale = verifier.verify_record(RecordKind::Attachments, &id).unwrap();
        assert!(!stale.current);
        assert!(!stale.entries[0].valid);
        assert!(!stale.all_valid());
    }

    #[test]
    fn test_volatile_change_only_moves_row_version() {
        let (store, registry, signer, verifier) = setup();
        let key = ed25519_signer();
        registry
            .register_capability(&key, "content", SignerRole::Content)
            .unwrap();
        let id = RecordId::new("a-1");
        let signed = signer.sign_record(RecordKind::Attachments, &id, &key).unwrap();
        let before = store.get_record(RecordKind::Attachments, &id).unwrap().unwrap();

        store
            .update_record(
                &Record::new(RecordKind::Attachments, "a-1")
                    .with("file_name", "readme.txt")
                    .with("file_hash_sha256", "ab12")
                    .with("last_search", "2024-05-01"),
            )
            .unwrap();
        let after = store.get_record(RecordKind::Attachments, &id).unwrap().unwrap();

        // The volatile field never reaches the canonical form; only the
        // store-owned version differs.
        let without_version = |record: &Record| {
            canonicalize(record)
                .as_str()
                .split('&')
                .filter(|pair| !pair.starts_with("row_version="))
                .map(str::to_owned)
                .collect::<Vec<_>>()
        };
        assert_eq!(without_version(&before), without_version(&after));
        assert!(!canonicalize(&after).as_str().contains("last_search"));

        let report = verifier.verify_record(RecordKind::Attachments, &id).unwrap();
        assert_ne!(report.digest, signed.digest);
        assert_eq!(report.row_version, 2);
        assert!(!report.current);
        assert!(!report.all_valid());

        signer.sign_record(RecordKind::Attachments, &id, &key).unwrap();
        assert!(verifier.verify_record(RecordKind::Attachments, &id).unwrap().all_valid());
    }
}
