//! Cleanup sweeper.
//!
//! One pass over every envelope. An envelope is removable when its record is
//! gone, when the record points elsewhere, or when the record has moved past
//! the signed version. Removal always archives first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mdsign_audit::ArchiveReason;
use mdsign_core::Envelope;
use mdsign_storage::{EnvelopeStore, RecordStore, SignatureStore};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::error::RuntimeResult;
use crate::lifecycle::{LifecycleManager, Removal};

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Envelopes examined.
    pub scanned: usize,
    /// Envelopes left alone.
    pub healthy: usize,
    /// Archive entries written.
    pub archived: usize,
    /// Envelopes deleted.
    pub deleted: usize,
    /// Envelopes archived but kept because a signer adopted or extended
    /// them before the delete.
    pub retained: usize,
    /// Envelopes that could not be processed.
    pub failed: usize,
    /// Removable envelopes per reason.
    pub classifications: BTreeMap<ArchiveReason, usize>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Whether the stop flag ended the sweep early.
    pub interrupted: bool,
}

impl SweepReport {
    /// Total removable envelopes found.
    #[must_use]
    pub fn removable(&self) -> usize {
        self.classifications
            .values()
            .fold(0_usize, |acc, n| acc.saturating_add(*n))
    }
}

/// Why an envelope is removable, with the record version seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Removal reason, `None` when healthy.
    pub reason: Option<ArchiveReason>,
    /// The record's row version, when the record exists.
    pub record_row_version: Option<u64>,
}

/// Batch cleanup of orphaned and stale envelopes.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn SignatureStore>,
    lifecycle: LifecycleManager,
    stop: Option<Arc<AtomicBool>>,
}

impl Sweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>, lifecycle: LifecycleManager) -> Self {
        Self {
            store,
            lifecycle,
            stop: None,
        }
    }

    /// Stop between envelopes once `flag` is set.
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Classify one envelope.
    ///
    /// Precedence: unknown kind, then missing record, then reference
    /// mismatch, then version.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub fn classify(&self, envelope: &Envelope) -> RuntimeResult<Verdict> {
        let Ok(kind) = envelope.kind() else {
            return Ok(Verdict {
                reason: Some(ArchiveReason::UnknownKind),
                record_row_version: None,
            });
        };
        let Some(record) = self.store.get_record(kind, &envelope.record_id)? else {
            return Ok(Verdict {
                reason: Some(ArchiveReason::RecordDeleted),
                record_row_version: None,
            });
        };

        let version = record.row_version()?;
        let reason = if record.reference()? != Some(envelope.id) {
            Some(ArchiveReason::NotReferenced)
        } else if version > envelope.signed_row_version {
            Some(ArchiveReason::VersionOutdated)
        } else {
            None
        };
        Ok(Verdict {
            reason,
            record_row_version: Some(version),
        })
    }

    /// Run one pass.
    ///
    /// With `dry_run` the envelopes are only classified. A failure on one
    /// envelope is logged and counted and the pass continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if the envelopes cannot be listed.
    pub fn sweep(&self, dry_run: bool) -> RuntimeResult<SweepReport> {
        let _span = info_span!("sweep", dry_run).entered();
        let mut report = SweepReport {
            dry_run,
            ..SweepReport::default()
        };

        for envelope in self.store.list_envelopes()? {
            if self.stop.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
                info!(scanned = report.scanned, "Sweep stopped");
                report.interrupted = true;
                break;
            }
            report.scanned = report.scanned.saturating_add(1);

            if let Err(e) = self.process(&envelope, dry_run, &mut report) {
                warn!(envelope_id = %envelope.id, error = %e, "Failed to process envelope");
                report.failed = report.failed.saturating_add(1);
            }
        }

        info!(
            scanned = report.scanned,
            healthy = report.healthy,
            archived = report.archived,
            deleted = report.deleted,
            retained = report.retained,
            failed = report.failed,
            "Sweep finished"
        );
        Ok(report)
    }

    fn process(
        &self,
        envelope: &Envelope,
        dry_run: bool,
        report: &mut SweepReport,
    ) -> RuntimeResult<()> {
        let verdict = self.classify(envelope)?;
        let Some(reason) = verdict.reason else {
            report.healthy = report.healthy.saturating_add(1);
            return Ok(());
        };

        let slot = report.classifications.entry(reason).or_insert(0);
        *slot = slot.saturating_add(1);
        debug!(
            envelope_id = %envelope.id,
            kind = %envelope.record_kind,
            record_id = %envelope.record_id,
            %reason,
            "Removable envelope"
        );
        if dry_run {
            return Ok(());
        }

        match self
            .lifecycle
            .archive_and_remove(envelope, reason, verdict.record_row_version)?
        {
            Removal::Removed => {
                report.archived = report.archived.saturating_add(1);
                report.deleted = report.deleted.saturating_add(1);
            },
            Removal::AlreadyGone => report.archived = report.archived.saturating_add(1),
            Removal::Retained => {
                report.archived = report.archived.saturating_add(1);
                report.retained = report.retained.saturating_add(1);
            },
            Removal::Kept => report.failed = report.failed.saturating_add(1),
        }
        Ok(())
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("stoppable", &self.stop.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsign_audit::AuditLog;
    use mdsign_core::{Algorithm, EnvelopeId, Record, RecordId, RecordKind, SignatureEntry, SignerId};
    use mdsign_storage::{MemoryStore, StaleDelete};

    struct Fixture {
        store: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
        lifecycle: LifecycleManager,
        sweeper: Sweeper,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::shared();
        let audit = Arc::new(AuditLog::in_memory());
        let lifecycle = LifecycleManager::new(store.clone(), audit.clone(), 3);
        let sweeper = Sweeper::new(store.clone(), lifecycle.clone());
        Fixture {
            store,
            audit,
            lifecycle,
            sweeper,
        }
    }

    fn signed(fx: &Fixture, id: &str) -> Envelope {
        fx.store
            .insert_record(&Record::new(RecordKind::Rhpatches, id).with("name", id))
            .unwrap();
        let current = fx
            .lifecycle
            .ensure_current_envelope(RecordKind::Rhpatches, &RecordId::new(id))
            .unwrap();
        fx.lifecycle
            .add_signature(&current.envelope, SignerId::new(), vec![9; 64], Algorithm::Ed25519, None)
            .unwrap();
        current.envelope
    }

    #[test]
    fn test_healthy_envelope_untouched() {
        let fx = fixture();
        let envelope = signed(&fx, "p-1");

        let report = fx.sweeper.sweep(false).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.removable(), 0);
        assert!(fx.store.get_envelope(envelope.id).unwrap().is_some());
        assert_eq!(fx.audit.stats().unwrap().archived, 0);
    }

    #[test]
    fn test_record_deleted() {
        let fx = fixture();
        let envelope = signed(&fx, "p-1");
        fx.store
            .delete_record(RecordKind::Rhpatches, &RecordId::new("p-1"))
            .unwrap();

        let report = fx.sweeper.sweep(false).unwrap();
        assert_eq!(
            report.classifications.get(&ArchiveReason::RecordDeleted),
            Some(&1)
        );
        assert_eq!(report.archived, 1);
        assert_eq!(report.deleted, 1);
        assert!(fx.store.get_envelope(envelope.id).unwrap().is_none());
        assert!(fx.store.list_entries(envelope.id).unwrap().is_empty());

        let stats = fx.audit.stats().unwrap();
        assert_eq!(stats.by_reason.get(&ArchiveReason::RecordDeleted), Some(&1));
        assert_eq!(stats.archived_signatures, 1);
    }

    #[test]
    fn test_version_outdated_and_not_referenced() {
        let fx = fixture();
        let outdated = signed(&fx, "p-1");
        fx.store
            .update_record(&Record::new(RecordKind::Rhpatches, "p-1").with("name", "v2"))
            .unwrap();

        // An envelope for p-2 that p-2 never adopted.
        signed(&fx, "p-2");
        let stray = Envelope::new(RecordKind::Rhpatches, RecordId::new("p-2"), 1);
        fx.store.create_envelope(&stray).unwrap();

        let verdict = fx.sweeper.classify(&outdated).unwrap();
        assert_eq!(verdict.reason, Some(ArchiveReason::VersionOutdated));
        assert_eq!(verdict.record_row_version, Some(2));
        assert_eq!(
            fx.sweeper.classify(&stray).unwrap().reason,
            Some(ArchiveReason::NotReferenced)
        );

        let report = fx.sweeper.sweep(false).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.deleted, 2);
    }

    #[test]
    fn test_unknown_kind() {
        let fx = fixture();
        let mut envelope = Envelope::new(RecordKind::Rhpatches, RecordId::new("x"), 1);
        envelope.record_kind = "retired_table".to_owned();
        fx.store.create_envelope(&envelope).unwrap();

        let report = fx.sweeper.sweep(false).unwrap();
        assert_eq!(
            report.classifications.get(&ArchiveReason::UnknownKind),
            Some(&1)
        );
        assert!(fx.store.get_envelope(envelope.id).unwrap().is_none());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let fx = fixture();
        let envelope = signed(&fx, "p-1");
        fx.store
            .delete_record(RecordKind::Rhpatches, &RecordId::new("p-1"))
            .unwrap();

        let report = fx.sweeper.sweep(true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.removable(), 1);
        assert_eq!(report.archived, 0);
        assert_eq!(report.deleted, 0);
        assert!(fx.store.get_envelope(envelope.id).unwrap().is_some());
        assert_eq!(fx.audit.count().unwrap(), 1);
    }

    #[test]
    fn test_idempotent() {
        let fx = fixture();
        signed(&fx, "p-1");
        fx.store
            .delete_record(RecordKind::Rhpatches, &RecordId::new("p-1"))
            .unwrap();

        assert_eq!(fx.sweeper.sweep(false).unwrap().deleted, 1);
        let second = fx.sweeper.sweep(false).unwrap();
        assert_eq!(second.scanned, 0);
        assert_eq!(second.deleted, 0);
    }

    #[test]
    fn test_stop_flag() {
        let fx = fixture();
        signed(&fx, "p-1");
        let flag = Arc::new(AtomicBool::new(true));
        let sweeper = fx.sweeper.clone().with_stop_flag(flag);

        let report = sweeper.sweep(false).unwrap();
        assert!(report.interrupted);
        assert_eq!(report.scanned, 0);
    }

    type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

    /// Runs a hook against the inner store right before the stale delete.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        hook: std::sync::Mutex<Option<Hook>>,
    }

    impl RecordStore for RacingStore {
        fn get_record(
            &self,
            kind: RecordKind,
            id: &RecordId,
        ) -> mdsign_storage::StorageResult<Option<Record>> {
            self.inner.get_record(kind, id)
        }

        fn list_record_ids(&self, kind: RecordKind) -> mdsign_storage::StorageResult<Vec<RecordId>> {
            self.inner.list_record_ids(kind)
        }

        fn insert_record(&self, record: &Record) -> mdsign_storage::StorageResult<()> {
            self.inner.insert_record(record)
        }

        fn update_record(&self, record: &Record) -> mdsign_storage::StorageResult<u64> {
            self.inner.update_record(record)
        }

        fn delete_record(&self, kind: RecordKind, id: &RecordId) -> mdsign_storage::StorageResult<bool> {
            self.inner.delete_record(kind, id)
        }

        fn compare_and_set_reference(
            &self,
            kind: RecordKind,
            id: &RecordId,
            expected_version: u64,
            expected: Option<EnvelopeId>,
            new: Option<EnvelopeId>,
        ) -> mdsign_storage::StorageResult<bool> {
            self.inner
                .compare_and_set_reference(kind, id, expected_version, expected, new)
        }
    }

    impl EnvelopeStore for RacingStore {
        fn create_envelope(&self, envelope: &Envelope) -> mdsign_storage::StorageResult<()> {
            self.inner.create_envelope(envelope)
        }

        fn get_envelope(&self, id: EnvelopeId) -> mdsign_storage::StorageResult<Option<Envelope>> {
            self.inner.get_envelope(id)
        }

        fn list_envelopes(&self) -> mdsign_storage::StorageResult<Vec<Envelope>> {
            self.inner.list_envelopes()
        }

        fn delete_envelope(&self, id: EnvelopeId) -> mdsign_storage::StorageResult<bool> {
            self.inner.delete_envelope(id)
        }

        fn delete_stale_envelope(
            &self,
            envelope: &Envelope,
            expected: &[SignatureEntry],
        ) -> mdsign_storage::StorageResult<StaleDelete> {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook(&self.inner);
            }
            self.inner.delete_stale_envelope(envelope, expected)
        }

        fn get_entry(
            &self,
            envelope_id: EnvelopeId,
            signer_id: SignerId,
        ) -> mdsign_storage::StorageResult<Option<SignatureEntry>> {
            self.inner.get_entry(envelope_id, signer_id)
        }

        fn insert_entry(&self, entry: &SignatureEntry) -> mdsign_storage::StorageResult<()> {
            self.inner.insert_entry(entry)
        }

        fn update_entry(&self, entry: &SignatureEntry) -> mdsign_storage::StorageResult<bool> {
            self.inner.update_entry(entry)
        }

        fn list_entries(
            &self,
            envelope_id: EnvelopeId,
        ) -> mdsign_storage::StorageResult<Vec<SignatureEntry>> {
            self.inner.list_entries(envelope_id)
        }
    }

    /// A record with an unadopted candidate envelope, and a sweeper whose
    /// delete is preceded by `hook`.
    fn racing(hook: Hook) -> (Arc<MemoryStore>, Arc<AuditLog>, Sweeper, Envelope) {
        let inner = MemoryStore::shared();
        inner
            .insert_record(&Record::new(RecordKind::Rhpatches, "p-1").with("name", "p-1"))
            .unwrap();
        let candidate = Envelope::new(RecordKind::Rhpatches, RecordId::new("p-1"), 1);
        inner.create_envelope(&candidate).unwrap();

        let store = Arc::new(RacingStore {
            inner: inner.clone(),
            hook: std::sync::Mutex::new(Some(hook)),
        });
        let audit = Arc::new(AuditLog::in_memory());
        let lifecycle = LifecycleManager::new(store.clone(), audit.clone(), 3);
        (inner, audit, Sweeper::new(store, lifecycle), candidate)
    }

    #[test]
    fn test_envelope_adopted_mid_sweep_survives() {
        let id = RecordId::new("p-1");
        let signer = SignerId::new();
        let hook_id = id.clone();
        let (store, _, sweeper, candidate) = racing(Box::new(move |store: &MemoryStore| {
            let envelope = store.list_envelopes().unwrap()[0].clone();
            assert!(
                store
                    .compare_and_set_reference(RecordKind::Rhpatches, &hook_id, 1, None, Some(envelope.id))
                    .unwrap()
            );
            store
                .insert_entry(&SignatureEntry::new(envelope.id, signer, vec![7; 64], Algorithm::Ed25519))
                .unwrap();
        }));

        let report = sweeper.sweep(false).unwrap();
        assert_eq!(
            report.classifications.get(&ArchiveReason::NotReferenced),
            Some(&1)
        );
        assert_eq!(report.deleted, 0);
        assert_eq!(report.retained, 1);

        let record = store.get_record(RecordKind::Rhpatches, &id).unwrap().unwrap();
        assert_eq!(record.reference().unwrap(), Some(candidate.id));
        assert!(store.get_envelope(candidate.id).unwrap().is_some());
        assert!(store.get_entry(candidate.id, signer).unwrap().is_some());

        // Now current, the next pass leaves it alone.
        let again = sweeper.sweep(false).unwrap();
        assert_eq!(again.healthy, 1);
        assert_eq!(again.deleted, 0);
    }

    #[test]
    fn test_late_signature_is_archived_on_next_pass() {
        let signer = SignerId::new();
        let (store, audit, sweeper, candidate) = racing(Box::new(move |store: &MemoryStore| {
            let envelope = store.list_envelopes().unwrap()[0].clone();
            store
                .insert_entry(&SignatureEntry::new(envelope.id, signer, vec![7; 64], Algorithm::Ed25519))
                .unwrap();
        }));

        let first = sweeper.sweep(false).unwrap();
        assert_eq!(first.retained, 1);
        assert!(store.get_entry(candidate.id, signer).unwrap().is_some());

        let second = sweeper.sweep(false).unwrap();
        assert_eq!(second.deleted, 1);
        assert!(store.get_envelope(candidate.id).unwrap().is_none());
        // The second archive carries the late signature.
        assert_eq!(audit.stats().unwrap().archived_signatures, 1);
    }
}
