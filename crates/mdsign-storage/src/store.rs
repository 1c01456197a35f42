//! Storage traits.
//!
//! Signing needs two collaborators: the tables holding the signable records
//! and the tables holding envelopes and their entries. Both are synchronous;
//! every call blocks on the backend and returns.
//!
//! # Version and reference
//!
//! `row_version` belongs to the store. [`RecordStore::insert_record`] starts
//! it at 1 and [`RecordStore::update_record`] bumps it, whatever the caller
//! passed. Changing the reference field via
//! [`RecordStore::compare_and_set_reference`] does not bump it, since the
//! reference is not part of the signed content.

use mdsign_core::{
    Envelope, EnvelopeId, Record, RecordId, RecordKind, SignatureEntry, SignerId,
};

use crate::error::StorageResult;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Access to signable records.
pub trait RecordStore: Send + Sync {
    /// Fetch a record by kind and primary key.
    ///
    /// Returns `None` if the record (or its table) does not exist.
    fn get_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>>;

    /// List the primary keys of every record of `kind`, in key order.
    fn list_record_ids(&self, kind: RecordKind) -> StorageResult<Vec<RecordId>>;

    /// Insert a new record at row version 1 with no reference.
    ///
    /// Fails with [`crate::StorageError::AlreadyExists`] if the key is taken.
    fn insert_record(&self, record: &Record) -> StorageResult<()>;

    /// Overwrite a record's content and bump its row version.
    ///
    /// The version and reference fields of `record` are ignored. Returns the
    /// new row version.
    fn update_record(&self, record: &Record) -> StorageResult<u64>;

    /// Delete a record. Returns `true` if it existed.
    fn delete_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool>;

    /// Atomically set the record's reference to `new`, provided its row
    /// version is still `expected_version` and its reference is still
    /// `expected`.
    ///
    /// Returns `false` when either guard fails. This single-row update is the
    /// only serialization point between concurrent signers.
    fn compare_and_set_reference(
        &self,
        kind: RecordKind,
        id: &RecordId,
        expected_version: u64,
        expected: Option<EnvelopeId>,
        new: Option<EnvelopeId>,
    ) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Result of [`EnvelopeStore::delete_stale_envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleDelete {
    /// The envelope and its entries were deleted.
    Deleted,
    /// There was no such envelope.
    Missing,
    /// Its record adopted it in the meantime.
    Current,
    /// Its entries no longer match the expected set.
    Changed,
}

/// Whether two entry lists hold the same signatures, ignoring order.
#[must_use]
pub fn same_entries(a: &[SignatureEntry], b: &[SignatureEntry]) -> bool {
    fn keyed(list: &[SignatureEntry]) -> Vec<(SignerId, &[u8])> {
        let mut keys: Vec<_> = list
            .iter()
            .map(|e| (e.signer_id, e.signature.as_slice()))
            .collect();
        keys.sort_unstable();
        keys
    }
    a.len() == b.len() && keyed(a) == keyed(b)
}

/// Access to envelopes and their signature entries.
pub trait EnvelopeStore: Send + Sync {
    /// Persist a new envelope.
    fn create_envelope(&self, envelope: &Envelope) -> StorageResult<()>;

    /// Fetch an envelope.
    fn get_envelope(&self, id: EnvelopeId) -> StorageResult<Option<Envelope>>;

    /// List every envelope of every kind, oldest first.
    fn list_envelopes(&self) -> StorageResult<Vec<Envelope>>;

    /// Delete an envelope together with all of its entries.
    ///
    /// Returns `true` if the envelope existed.
    fn delete_envelope(&self, id: EnvelopeId) -> StorageResult<bool>;

    /// Delete a stale envelope and its entries in one step, provided it is
    /// still stale and still holds exactly `expected` entries.
    ///
    /// An envelope is current when its record references it and the
    /// record's row version has not moved past the signed version. Such an
    /// envelope, or one whose entries differ from `expected` by signer or
    /// signature bytes, is left alone.
    fn delete_stale_envelope(
        &self,
        envelope: &Envelope,
        expected: &[SignatureEntry],
    ) -> StorageResult<StaleDelete>;

    /// Fetch the entry a signer holds in an envelope.
    fn get_entry(
        &self,
        envelope_id: EnvelopeId,
        signer_id: SignerId,
    ) -> StorageResult<Option<SignatureEntry>>;

    /// Insert an entry.
    ///
    /// Fails with [`crate::StorageError::AlreadyExists`] if the signer
    /// already has an entry in that envelope, and with
    /// [`crate::StorageError::NotFound`] if the envelope does not exist.
    fn insert_entry(&self, entry: &SignatureEntry) -> StorageResult<()>;

    /// Replace the signature, algorithms and timestamp of the entry matching
    /// `entry`'s (envelope, signer) pair. Returns `false` if there is none.
    fn update_entry(&self, entry: &SignatureEntry) -> StorageResult<bool>;

    /// List the entries of an envelope, oldest first.
    fn list_entries(&self, envelope_id: EnvelopeId) -> StorageResult<Vec<SignatureEntry>>;
}

/// A backend providing both records and envelopes.
pub trait SignatureStore: RecordStore + EnvelopeStore {}

impl<T: RecordStore + EnvelopeStore> SignatureStore for T {}
