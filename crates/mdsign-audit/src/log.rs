//! Audit log - main interface for audit logging.

use std::collections::BTreeMap;
use std::path::Path;

use mdsign_core::{EnvelopeId, RecordId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::entry::{ArchiveReason, AuditEntry};
use crate::error::AuditResult;
use crate::storage::{AuditStorage, JsonlAuditStorage, MemoryAuditStorage};

/// Audit log of new and archived signatures.
pub struct AuditLog {
    storage: Box<dyn AuditStorage>,
}

/// Summary counts over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Total entries.
    pub total: usize,
    /// New-signature entries.
    pub new_signatures: usize,
    /// Archived entries.
    pub archived: usize,
    /// Archived entries per reason.
    pub by_reason: BTreeMap<ArchiveReason, usize>,
    /// Signatures preserved inside archived entries.
    pub archived_signatures: usize,
}

impl AuditLog {
    /// Create an audit log with a custom storage backend.
    #[must_use]
    pub fn with_storage(storage: Box<dyn AuditStorage>) -> Self {
        Self { storage }
    }

    /// Open a JSON Lines audit log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        Ok(Self::with_storage(Box::new(JsonlAuditStorage::open(path)?)))
    }

    /// Create an in-memory audit log (for testing).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_storage(Box::new(MemoryAuditStorage::new()))
    }

    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be stored.
    pub fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        debug!(
            envelope_id = %entry.envelope_id(),
            kind = %entry.record_kind(),
            record_id = %entry.record_id(),
            action = %entry.description(),
            "Appending audit entry"
        );
        self.storage.store(entry)
    }

    /// Append an entry, logging instead of failing.
    ///
    /// Lifecycle operations use this: losing an audit line must not undo a
    /// signature or block a cleanup. Returns whether the entry was stored.
    pub fn append_or_warn(&self, entry: &AuditEntry) -> bool {
        match self.append(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    envelope_id = %entry.envelope_id(),
                    error = %e,
                    "Failed to write audit entry"
                );
                false
            },
        }
    }

    /// All entries, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        self.storage.entries()
    }

    /// Every entry about one record, oldest first. Includes entries for
    /// envelopes that have since been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn history_for_record(&self, kind: &str, id: &RecordId) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.is_for_record(kind, id))
            .collect())
    }

    /// Every entry about one envelope, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn history_for_envelope(&self, id: EnvelopeId) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.envelope_id() == id)
            .collect())
    }

    /// Total entry count.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn count(&self) -> AuditResult<usize> {
        self.storage.count()
    }

    /// Summary counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn stats(&self) -> AuditResult<AuditStats> {
        let mut stats = AuditStats::default();
        for entry in self.entries()? {
            stats.total = stats.total.saturating_add(1);
            match entry {
                AuditEntry::NewSignature(_) => {
                    stats.new_signatures = stats.new_signatures.saturating_add(1);
                },
                AuditEntry::Archived(archived) => {
                    stats.archived = stats.archived.saturating_add(1);
                    stats.archived_signatures =
                        stats.archived_signatures.saturating_add(archived.entries.len());
                    let slot = stats.by_reason.entry(archived.reason).or_insert(0);
                    *slot = slot.saturating_add(1);
                },
            }
        }
        Ok(stats)
    }

    /// Flush pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to flush.
    pub fn flush(&self) -> AuditResult<()> {
        self.storage.flush()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
