//! Record signing.

use std::fmt;
use std::sync::Arc;

use mdsign_core::{
    EnvelopeId, RecordId, RecordKind, SignerId, SignerRole, canonicalize, clean_snapshot,
};
use mdsign_crypto::{ContentHash, SigningCapability};
use mdsign_storage::{EnvelopeStore, RecordStore, SignatureStore};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::lifecycle::{AddOutcome, EnsureOutcome, LifecycleManager};
use crate::registry::SignerRegistry;

/// Result of signing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutcome {
    /// Record kind.
    pub kind: RecordKind,
    /// Record primary key.
    pub record_id: RecordId,
    /// Envelope the signature went into.
    pub envelope_id: EnvelopeId,
    /// Row version that was signed.
    pub row_version: u64,
    /// SHA-256 of the canonical form.
    pub digest: ContentHash,
    /// How the envelope was obtained.
    pub envelope: EnsureOutcome,
    /// Whether the entry was new.
    pub entry: AddOutcome,
}

impl SignOutcome {
    /// Human-readable status.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match (self.envelope, self.entry) {
            (EnsureOutcome::Rotated { archived: Some(_) }, _) => "archived stale and recreated",
            (EnsureOutcome::Rotated { archived: None }, _) => "recreated",
            (_, AddOutcome::Updated) => "re-signed",
            (_, AddOutcome::Inserted) => "signed",
        }
    }
}

/// A record that could not be signed during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignFailure {
    /// Record primary key.
    pub record_id: RecordId,
    /// What went wrong.
    pub error: String,
}

/// Counts from [`RecordSigner::sign_outstanding`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignAllReport {
    /// Records signed during this run.
    pub signed: usize,
    /// Records that already carried a current signature from this signer.
    pub already_signed: usize,
    /// Records that failed.
    pub failed: Vec<SignFailure>,
}

/// Signs records with a caller-supplied capability.
#[derive(Clone)]
pub struct RecordSigner {
    store: Arc<dyn SignatureStore>,
    registry: SignerRegistry,
    lifecycle: LifecycleManager,
    max_attempts: u32,
}

impl RecordSigner {
    /// Create a signer service.
    #[must_use]
    pub fn new(
        store: Arc<dyn SignatureStore>,
        registry: SignerRegistry,
        lifecycle: LifecycleManager,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            registry,
            lifecycle,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sign one record.
    ///
    /// The capability must belong to a registered content signer. If the
    /// record changes between reading it and fixing its envelope, the whole
    /// read-sign cycle is repeated.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RecordNotFound`], a registry error if the
    /// capability is not acceptable, or [`RuntimeError::Contention`] if the
    /// record never held still.
    pub fn sign_record(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
        capability: &dyn SigningCapability,
    ) -> RuntimeResult<SignOutcome> {
        let _span = info_span!("sign_record", %kind, %record_id).entered();
        let signer = self
            .registry
            .check_capability(capability, Some(SignerRole::Content))?;

        for attempt in 1..=self.max_attempts {
            let record = self.store.get_record(kind, record_id)?.ok_or_else(|| {
                RuntimeError::RecordNotFound {
                    kind,
                    record_id: record_id.clone(),
                }
            })?;
            let version = record.row_version()?;
            let digest = ContentHash::hash(canonicalize(&record).as_bytes());

            let current = self.lifecycle.ensure_current_envelope(kind, record_id)?;
            if current.envelope.signed_row_version != version {
                debug!(
                    attempt,
                    read = version,
                    current = current.envelope.signed_row_version,
                    "Record changed while signing, retrying"
                );
                continue;
            }

            let signature = capability.sign(digest.as_bytes())?;
            let entry = match self.lifecycle.add_signature(
                &current.envelope,
                signer.id,
                signature,
                capability.algorithm(),
                Some(clean_snapshot(&record)),
            ) {
                Ok(entry) => entry,
                Err(RuntimeError::EnvelopeNotFound(id)) => {
                    debug!(attempt, envelope_id = %id, "Envelope removed while signing, retrying");
                    continue;
                },
                Err(e) => return Err(e),
            };

            let outcome = SignOutcome {
                kind,
                record_id: record_id.clone(),
                envelope_id: current.envelope.id,
                row_version: version,
                digest,
                envelope: current.outcome,
                entry,
            };
            info!(
                signer_id = %signer.id,
                envelope_id = %outcome.envelope_id,
                row_version = version,
                status = outcome.status(),
                "Signed record"
            );
            return Ok(outcome);
        }

        Err(RuntimeError::Contention {
            kind,
            record_id: record_id.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Sign every record of `kind` that lacks a current signature from this
    /// capability's signer.
    ///
    /// Per-record failures are collected; the batch keeps going.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability is not acceptable or the records
    /// cannot be listed.
    pub fn sign_outstanding(
        &self,
        kind: RecordKind,
        capability: &dyn SigningCapability,
    ) -> RuntimeResult<SignAllReport> {
        self.registry
            .check_capability(capability, Some(SignerRole::Content))?;
        let signer = capability.signer_id();

        let mut report = SignAllReport::default();
        for record_id in self.store.list_record_ids(kind)? {
            match self.is_signed_by(kind, &record_id, signer) {
                Ok(true) => {
                    report.already_signed = report.already_signed.saturating_add(1);
                    continue;
                },
                Ok(false) => {},
                Err(e) => {
                    warn!(%kind, %record_id, error = %e, "Could not inspect record");
                    report.failed.push(SignFailure {
                        record_id,
                        error: e.to_string(),
                    });
                    continue;
                },
            }

            match self.sign_record(kind, &record_id, capability) {
                Ok(_) => report.signed = report.signed.saturating_add(1),
                Err(e) => {
                    warn!(%kind, %record_id, error = %e, "Failed to sign record");
                    report.failed.push(SignFailure {
                        record_id,
                        error: e.to_string(),
                    });
                },
            }
        }

        info!(
            %kind,
            signed = report.signed,
            already_signed = report.already_signed,
            failed = report.failed.len(),
            "Signed outstanding records"
        );
        Ok(report)
    }

    /// Whether the record's current envelope holds an entry from `signer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn is_signed_by(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
        signer: SignerId,
    ) -> RuntimeResult<bool> {
        let Some(record) = self.store.get_record(kind, record_id)? else {
            return Ok(false);
        };
        let Some(envelope_id) = record.reference()? else {
            return Ok(false);
        };
        let Some(envelope) = self.store.get_envelope(envelope_id)? else {
            return Ok(false);
        };
        if !envelope.is_current_for(&record)? {
            return Ok(false);
        }
        Ok(self.store.get_entry(envelope.id, signer)?.is_some())
    }
}

impl fmt::Debug for RecordSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSigner")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsign_audit::AuditLog;
    use mdsign_core::Record;
    use mdsign_crypto::LocalSigner;
    use mdsign_storage::MemoryStore;
    use mdsign_test::{ed25519_signer, rsa_signer};

    struct Fixture {
        store: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
        signer: RecordSigner,
        registry: SignerRegistry,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::shared();
        let audit = Arc::new(AuditLog::in_memory());
        let registry = SignerRegistry::new(store.clone());
        let lifecycle = LifecycleManager::new(store.clone(), audit.clone(), 3);
        let signer = RecordSigner::new(store.clone(), registry.clone(), lifecycle, 3);
        for id in ["p-1", "p-2", "p-3"] {
            store
                .insert_record(&Record::new(RecordKind::Rhpatches, id).with("name", id))
                .unwrap();
        }
        Fixture {
            store,
            audit,
            signer,
            registry,
        }
    }

    fn content(fx: &Fixture, key: &LocalSigner) {
        fx.registry
            .register_capability(key, "content", SignerRole::Content)
            .unwrap();
    }

    #[test]
    fn test_sign_record_verifies_against_registry() {
        let fx = fixture();
        let key = ed25519_signer();
        content(&fx, &key);

        let id = RecordId::new("p-1");
        let outcome = fx.signer.sign_record(RecordKind::Rhpatches, &id, &key).unwrap();
        assert_eq!(outcome.status(), "signed");
        assert_eq!(outcome.row_version, 1);

        let entry = fx
            .store
            .get_entry(outcome.envelope_id, key.signer_id())
            .unwrap()
            .unwrap();
        assert!(
            fx.registry
                .verify(
                    key.signer_id(),
                    outcome.digest.as_bytes(),
                    &entry.signature,
                    entry.algorithm
                )
                .unwrap()
        );

        let again = fx.signer.sign_record(RecordKind::Rhpatches, &id, &key).unwrap();
        assert_eq!(again.status(), "re-signed");
        assert_eq!(again.envelope_id, outcome.envelope_id);
    }

    #[test]
    fn test_sign_after_mutation_archives_stale() {
        let fx = fixture();
        let key = rsa_signer();
        content(&fx, &key);
        let id = RecordId::new("p-2");

        let first = fx.signer.sign_record(RecordKind::Rhpatches, &id, &key).unwrap();
        fx.store
            .update_record(&Record::new(RecordKind::Rhpatches, "p-2").with("name", "changed"))
            .unwrap();
        let second = fx.signer.sign_record(RecordKind::Rhpatches, &id, &key).unwrap();

        assert_eq!(second.status(), "archived stale and recreated");
        assert_eq!(second.row_version, 2);
        assert_ne!(second.envelope_id, first.envelope_id);
        assert_ne!(second.digest, first.digest);
        assert_eq!(fx.audit.stats().unwrap().archived, 1);
    }

    #[test]
    fn test_service_signer_cannot_sign_records() {
        let fx = fixture();
        let key = ed25519_signer();
        fx.registry
            .register_capability(&key, "api", SignerRole::Service)
            .unwrap();
        assert!(matches!(
            fx.signer
                .sign_record(RecordKind::Rhpatches, &RecordId::new("p-1"), &key),
            Err(RuntimeError::WrongRole { .. })
        ));
    }

    #[test]
    fn test_unregistered_signer_rejected() {
        let fx = fixture();
        assert!(matches!(
            fx.signer.sign_record(
                RecordKind::Rhpatches,
                &RecordId::new("p-1"),
                &ed25519_signer()
            ),
            Err(RuntimeError::SignerNotFound(_))
        ));
    }

    #[test]
    fn test_missing_record() {
        let fx = fixture();
        let key = ed25519_signer();
        content(&fx, &key);
        assert!(matches!(
            fx.signer
                .sign_record(RecordKind::Rhpatches, &RecordId::new("nope"), &key),
            Err(RuntimeError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_sign_outstanding_skips_signed() {
        let fx = fixture();
        let key = ed25519_signer();
        content(&fx, &key);
        fx.signer
            .sign_record(RecordKind::Rhpatches, &RecordId::new("p-1"), &key)
            .unwrap();

        let report = fx.signer.sign_outstanding(RecordKind::Rhpatches, &key).unwrap();
        assert_eq!(report.signed, 2);
        assert_eq!(report.already_signed, 1);
        assert!(report.failed.is_empty());

        let rerun = fx.signer.sign_outstanding(RecordKind::Rhpatches, &key).unwrap();
        assert_eq!(rerun.signed, 0);
        assert_eq!(rerun.already_signed, 3);
    }

    #[test]
    fn test_sign_outstanding_after_mutation() {
        let fx = fixture();
        let key = ed25519_signer();
        content(&fx, &key);
        fx.signer.sign_outstanding(RecordKind::Rhpatches, &key).unwrap();

        fx.store
            .update_record(&Record::new(RecordKind::Rhpatches, "p-3").with("name", "v2"))
            .unwrap();
        assert!(
            !fx.signer
                .is_signed_by(RecordKind::Rhpatches, &RecordId::new("p-3"), key.signer_id())
                .unwrap()
        );

        let report = fx.signer.sign_outstanding(RecordKind::Rhpatches, &key).unwrap();
        assert_eq!(report.signed, 1);
        assert_eq!(report.already_signed, 2);
    }
}
