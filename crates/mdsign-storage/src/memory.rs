//! In-memory backend for tests and ephemeral use.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mdsign_core::{
    Envelope, EnvelopeId, Record, RecordId, RecordKind, SignatureEntry, SignerId,
};

use crate::error::{StorageError, StorageResult};
use crate::store::{EnvelopeStore, RecordStore, StaleDelete, same_entries};

fn read<T>(lock: &RwLock<T>) -> StorageResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|e| StorageError::Internal(e.to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StorageResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|e| StorageError::Internal(e.to_string()))
}

/// In-memory record and envelope store.
///
/// Every operation takes the relevant lock for its whole duration, so the
/// compare-and-set on a record reference is atomic as required.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKind, BTreeMap<RecordId, Record>>>,
    envelopes: RwLock<HashMap<EnvelopeId, Envelope>>,
    entries: RwLock<HashMap<EnvelopeId, Vec<SignatureEntry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl RecordStore for MemoryStore {
    fn get_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        let records = read(&self.records)?;
        Ok(records.get(&kind).and_then(|table| table.get(id)).cloned())
    }

    fn list_record_ids(&self, kind: RecordKind) -> StorageResult<Vec<RecordId>> {
        let records = read(&self.records)?;
        Ok(records
            .get(&kind)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_record(&self, record: &Record) -> StorageResult<()> {
        let id = record.id()?;
        let mut stored = record.clone();
        stored.set_row_version(1);
        stored.set_reference(None);

        let mut records = write(&self.records)?;
        let table = records.entry(record.kind()).or_default();
        if table.contains_key(&id) {
            return Err(StorageError::AlreadyExists(format!("{} {id}", record.kind())));
        }
        table.insert(id, stored);
        Ok(())
    }

    fn update_record(&self, record: &Record) -> StorageResult<u64> {
        let id = record.id()?;
        let mut records = write(&self.records)?;
        let existing = records
            .get_mut(&record.kind())
            .and_then(|table| table.get_mut(&id))
            .ok_or_else(|| StorageError::NotFound(format!("{} {id}", record.kind())))?;

        let version = existing
            .row_version()?
            .checked_add(1)
            .ok_or_else(|| StorageError::Internal(format!("row version overflow for {id}")))?;
        let reference = existing.reference()?;

        let mut updated = record.clone();
        updated.set_row_version(version);
        updated.set_reference(reference);
        *existing = updated;
        Ok(version)
    }

    fn delete_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let mut records = write(&self.records)?;
        Ok(records
            .get_mut(&kind)
            .is_some_and(|table| table.remove(id).is_some()))
    }

    fn compare_and_set_reference(
        &self,
        kind: RecordKind,
        id: &RecordId,
        expected_version: u64,
        expected: Option<EnvelopeId>,
        new: Option<EnvelopeId>,
    ) -> StorageResult<bool> {
        let mut records = write(&self.records)?;
        let record = records
            .get_mut(&kind)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {id}")))?;

        if record.row_version()? != expected_version || record.reference()? != expected {
            return Ok(false);
        }
        record.set_reference(new);
        Ok(true)
    }
}

impl EnvelopeStore for MemoryStore {
    fn create_envelope(&self, envelope: &Envelope) -> StorageResult<()> {
        let mut envelopes = write(&self.envelopes)?;
        if envelopes.contains_key(&envelope.id) {
            return Err(StorageError::AlreadyExists(format!("envelope {}", envelope.id)));
        }
        envelopes.insert(envelope.id, envelope.clone());
        Ok(())
    }

    fn get_envelope(&self, id: EnvelopeId) -> StorageResult<Option<Envelope>> {
        Ok(read(&self.envelopes)?.get(&id).cloned())
    }

    fn list_envelopes(&self) -> StorageResult<Vec<Envelope>> {
        let mut all: Vec<Envelope> = read(&self.envelopes)?.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn delete_envelope(&self, id: EnvelopeId) -> StorageResult<bool> {
        // Envelopes before entries, everywhere.
        let mut envelopes = write(&self.envelopes)?;
        let mut entries = write(&self.entries)?;
        entries.remove(&id);
        Ok(envelopes.remove(&id).is_some())
    }

    fn delete_stale_envelope(
        &self,
        envelope: &Envelope,
        expected: &[SignatureEntry],
    ) -> StorageResult<StaleDelete> {
        // Records, then envelopes, then entries.
        let records = read(&self.records)?;
        let mut envelopes = write(&self.envelopes)?;
        let mut entries = write(&self.entries)?;

        if !envelopes.contains_key(&envelope.id) {
            return Ok(StaleDelete::Missing);
        }
        if let Ok(kind) = envelope.kind()
            && let Some(record) = records
                .get(&kind)
                .and_then(|table| table.get(&envelope.record_id))
            && record.reference()? == Some(envelope.id)
            && record.row_version()? <= envelope.signed_row_version
        {
            return Ok(StaleDelete::Current);
        }
        let held = entries.get(&envelope.id).map_or(&[][..], Vec::as_slice);
        if !same_entries(held, expected) {
            return Ok(StaleDelete::Changed);
        }

        entries.remove(&envelope.id);
        envelopes.remove(&envelope.id);
        Ok(StaleDelete::Deleted)
    }

    fn get_entry(
        &self,
        envelope_id: EnvelopeId,
        signer_id: SignerId,
    ) -> StorageResult<Option<SignatureEntry>> {
        let entries = read(&self.entries)?;
        Ok(entries
            .get(&envelope_id)
            .and_then(|list| list.iter().find(|e| e.signer_id == signer_id))
            .cloned())
    }

    fn insert_entry(&self, entry: &SignatureEntry) -> StorageResult<()> {
        let envelopes = read(&self.envelopes)?;
        if !envelopes.contains_key(&entry.envelope_id) {
            return Err(StorageError::NotFound(format!("envelope {}", entry.envelope_id)));
        }
        let mut entries = write(&self.entries)?;
        let list = entries.entry(entry.envelope_id).or_default();
        if list.iter().any(|e| e.signer_id == entry.signer_id) {
            return Err(StorageError::AlreadyExists(format!(
                "entry for signer {} in envelope {}",
                entry.signer_id, entry.envelope_id
            )));
        }
        list.push(entry.clone());
        Ok(())
    }

    fn update_entry(&self, entry: &SignatureEntry) -> StorageResult<bool> {
        let mut entries = write(&self.entries)?;
        let Some(existing) = entries
            .get_mut(&entry.envelope_id)
            .and_then(|list| list.iter_mut().find(|e| e.signer_id == entry.signer_id))
        else {
            return Ok(false);
        };
        existing.signature.clone_from(&entry.signature);
        existing.algorithm = entry.algorithm;
        existing.hash_algorithm = entry.hash_algorithm;
        existing.signed_at = entry.signed_at;
        Ok(true)
    }

    fn list_entries(&self, envelope_id: EnvelopeId) -> StorageResult<Vec<SignatureEntry>> {
        let entries = read(&self.entries)?;
        Ok(entries.get(&envelope_id).cloned().unwrap_or_default())
    }
}
