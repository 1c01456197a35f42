//! Envelope lifecycle.
//!
//! The only serialization point is the store's compare-and-set on a record's
//! reference. The manager creates a candidate envelope, tries to swing the
//! reference to it, and throws the candidate away if another writer won.

use std::sync::Arc;

use mdsign_audit::{ArchiveReason, AuditEntry, AuditLog, RecordSnapshot};
use mdsign_core::{Algorithm, Envelope, EnvelopeId, RecordId, RecordKind, SignatureEntry, SignerId};
use mdsign_storage::{EnvelopeStore, RecordStore, SignatureStore, StaleDelete, StorageError};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// How [`LifecycleManager::ensure_current_envelope`] got its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The record had no envelope; a new one was created.
    Created,
    /// The existing envelope was already current.
    Reused,
    /// The old envelope was stale or missing and was replaced.
    Rotated {
        /// The envelope that was archived and removed, if any.
        archived: Option<EnvelopeId>,
    },
}

/// The current envelope for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEnvelope {
    /// The envelope.
    pub envelope: Envelope,
    /// How it was obtained.
    pub outcome: EnsureOutcome,
}

/// What [`LifecycleManager::add_signature`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was inserted.
    Inserted,
    /// The signer's existing entry was replaced in place.
    Updated,
}

/// Result of archiving one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Archived and deleted.
    Removed,
    /// Archived, but someone else deleted it first.
    AlreadyGone,
    /// Archived, but its record adopted it or a signature landed in it
    /// before the delete, so it was kept.
    Retained,
    /// The archive entry could not be written, so the envelope was kept.
    Kept,
}

impl Removal {
    /// Whether the envelope was archived and is now gone.
    #[must_use]
    pub fn archived(self) -> bool {
        matches!(self, Self::Removed | Self::AlreadyGone)
    }
}

/// Creates, rotates and archives envelopes.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn SignatureStore>,
    audit: Arc<AuditLog>,
    max_attempts: u32,
}

impl LifecycleManager {
    /// Create a manager.
    ///
    /// `max_attempts` bounds how often a lost compare-and-set is retried.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>, audit: Arc<AuditLog>, max_attempts: u32) -> Self {
        Self {
            store,
            audit,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return an envelope that is current for the record, creating or
    /// rotating as needed.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RecordNotFound`] if the record does not exist,
    /// or [`RuntimeError::Contention`] if every attempt lost the race.
    pub fn ensure_current_envelope(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
    ) -> RuntimeResult<CurrentEnvelope> {
        for attempt in 1..=self.max_attempts {
            let record = self.store.get_record(kind, record_id)?.ok_or_else(|| {
                RuntimeError::RecordNotFound {
                    kind,
                    record_id: record_id.clone(),
                }
            })?;
            let version = record.row_version()?;
            let reference = record.reference()?;

            let existing = match reference {
                Some(id) => self.store.get_envelope(id)?,
                None => None,
            };
            if let Some(envelope) = existing.as_ref()
                && envelope.signed_row_version == version
            {
                return Ok(CurrentEnvelope {
                    envelope: envelope.clone(),
                    outcome: EnsureOutcome::Reused,
                });
            }

            let fresh = Envelope::new(kind, record_id.clone(), version);
            self.store.create_envelope(&fresh)?;

            let swapped = match self.store.compare_and_set_reference(
                kind,
                record_id,
                version,
                reference,
                Some(fresh.id),
            ) {
                Ok(swapped) => swapped,
                Err(StorageError::NotFound(_)) => {
                    self.store.delete_envelope(fresh.id)?;
                    return Err(RuntimeError::RecordNotFound {
                        kind,
                        record_id: record_id.clone(),
                    });
                },
                Err(e) => {
                    self.discard(fresh.id);
                    return Err(e.into());
                },
            };

            if !swapped {
                debug!(
                    %kind,
                    %record_id,
                    attempt,
                    "Lost reference swap, retrying"
                );
                self.store.delete_envelope(fresh.id)?;
                continue;
            }

            let outcome = match (reference, existing) {
                (None, _) => EnsureOutcome::Created,
                (Some(dangling), None) => {
                    debug!(%kind, %record_id, envelope_id = %dangling, "Replaced dangling reference");
                    EnsureOutcome::Rotated { archived: None }
                },
                (Some(_), Some(old)) => {
                    let removal =
                        self.archive_and_remove(&old, ArchiveReason::VersionOutdated, Some(version))?;
                    EnsureOutcome::Rotated {
                        archived: removal.archived().then_some(old.id),
                    }
                },
            };

            info!(
                %kind,
                %record_id,
                envelope_id = %fresh.id,
                row_version = version,
                ?outcome,
                "New current envelope"
            );
            return Ok(CurrentEnvelope {
                envelope: fresh,
                outcome,
            });
        }

        Err(RuntimeError::Contention {
            kind,
            record_id: record_id.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Add or replace `signer`'s entry in `envelope`.
    ///
    /// Every signature written, inserted or replacing an older one, gets a
    /// new-signature audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EnvelopeNotFound`] if the envelope was removed
    /// in the meantime.
    pub fn add_signature(
        &self,
        envelope: &Envelope,
        signer: SignerId,
        signature: Vec<u8>,
        algorithm: Algorithm,
        snapshot: Option<RecordSnapshot>,
    ) -> RuntimeResult<AddOutcome> {
        let entry = SignatureEntry::new(envelope.id, signer, signature, algorithm);

        let outcome = if self.store.update_entry(&entry)? {
            AddOutcome::Updated
        } else {
            match self.store.insert_entry(&entry) {
                Ok(()) => AddOutcome::Inserted,
                // Another call for the same signer got there first.
                Err(StorageError::AlreadyExists(_)) => {
                    if !self.store.update_entry(&entry)? {
                        return Err(RuntimeError::EnvelopeNotFound(envelope.id));
                    }
                    AddOutcome::Updated
                },
                Err(StorageError::NotFound(_)) => {
                    return Err(RuntimeError::EnvelopeNotFound(envelope.id));
                },
                Err(e) => return Err(e.into()),
            }
        };

        self.audit
            .append_or_warn(&AuditEntry::new_signature(envelope, &entry, snapshot));
        debug!(envelope_id = %envelope.id, signer_id = %signer, ?outcome, "Stored signature");
        Ok(outcome)
    }

    /// Archive `envelope` with all its entries, then delete it.
    ///
    /// If the archive entry cannot be written the envelope is left in place
    /// so a later sweep can try again. The delete only goes through while
    /// the envelope is still stale and holds exactly the archived entries;
    /// otherwise it is [`Removal::Retained`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn archive_and_remove(
        &self,
        envelope: &Envelope,
        reason: ArchiveReason,
        record_row_version: Option<u64>,
    ) -> RuntimeResult<Removal> {
        let snapshot = self.store.list_entries(envelope.id)?;
        let signatures = snapshot.len();
        let entry =
            AuditEntry::archived(envelope.clone(), snapshot.clone(), reason, record_row_version);

        if !self.audit.append_or_warn(&entry) {
            warn!(
                envelope_id = %envelope.id,
                %reason,
                "Keeping envelope until it can be archived"
            );
            return Ok(Removal::Kept);
        }

        let removal = match self.store.delete_stale_envelope(envelope, &snapshot)? {
            StaleDelete::Deleted => Removal::Removed,
            StaleDelete::Missing => Removal::AlreadyGone,
            verdict @ (StaleDelete::Current | StaleDelete::Changed) => {
                warn!(
                    envelope_id = %envelope.id,
                    %reason,
                    ?verdict,
                    "Envelope changed while being archived, keeping it"
                );
                return Ok(Removal::Retained);
            },
        };
        info!(
            envelope_id = %envelope.id,
            kind = %envelope.record_kind,
            record_id = %envelope.record_id,
            %reason,
            signatures,
            "Archived envelope"
        );
        Ok(removal)
    }

    fn discard(&self, id: EnvelopeId) {
        if let Err(e) = self.store.delete_envelope(id) {
            warn!(envelope_id = %id, error = %e, "Failed to discard unused envelope");
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
