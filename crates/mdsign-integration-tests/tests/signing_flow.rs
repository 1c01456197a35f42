//! End-to-end signing: version bumps, several signers, batch signing.

mod common;

use common::Harness;
use mdsign_audit::{ArchiveReason, AuditEntry};
use mdsign_core::{RecordId, RecordKind};
use mdsign_crypto::SigningCapability;
use mdsign_storage::{EnvelopeStore, RecordStore};
use mdsign_test::{ed25519_signer, rsa_signer, sample_record};

#[test]
fn version_bump_archives_previous_signatures() {
    let h = Harness::memory(&[sample_record(RecordKind::Gameversions, "gv-x")]);
    let alice = ed25519_signer();
    let bob = ed25519_signer();
    h.content_signer(&alice, "alice");
    h.content_signer(&bob, "bob");
    let id = RecordId::new("gv-x");

    let first = h
        .runtime
        .sign_record(RecordKind::Gameversions, &id, &alice)
        .unwrap();
    assert_eq!(first.row_version, 1);

    let edited = sample_record(RecordKind::Gameversions, "gv-x").with("name", "Kaizo Demo II");
    assert_eq!(h.store.update_record(&edited).unwrap(), 2);

    let second = h
        .runtime
        .sign_record(RecordKind::Gameversions, &id, &bob)
        .unwrap();
    assert_eq!(second.status(), "archived stale and recreated");
    assert_eq!(second.row_version, 2);
    assert_ne!(second.envelope_id, first.envelope_id);

    // The old envelope is gone and only bob signed the new one.
    assert!(h.store.get_envelope(first.envelope_id).unwrap().is_none());
    let entries = h.store.list_entries(second.envelope_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].signer_id, bob.signer_id());

    let archived: Vec<_> = h
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            AuditEntry::Archived(a) => Some(a),
            AuditEntry::NewSignature(_) => None,
        })
        .collect();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].reason, ArchiveReason::VersionOutdated);
    assert_eq!(archived[0].envelope.id, first.envelope_id);
    assert_eq!(archived[0].entries.len(), 1);
    assert_eq!(archived[0].entries[0].signer_id, alice.signer_id());

    let verification = h.runtime.verify_record(RecordKind::Gameversions, &id).unwrap();
    assert!(verification.all_valid());
    assert_eq!(verification.entries.len(), 1);
}

#[test]
fn two_signers_share_one_envelope() {
    let h = Harness::memory(&[sample_record(RecordKind::Rhpatches, "rhp-1")]);
    let alice = ed25519_signer();
    let bob = rsa_signer();
    h.content_signer(&alice, "alice");
    h.content_signer(&bob, "bob");
    let id = RecordId::new("rhp-1");

    let a = h.runtime.sign_record(RecordKind::Rhpatches, &id, &alice).unwrap();
    let b = h.runtime.sign_record(RecordKind::Rhpatches, &id, &bob).unwrap();
    assert_eq!(a.envelope_id, b.envelope_id);
    assert_eq!(a.digest, b.digest);
    assert_eq!(b.status(), "signed");

    assert_eq!(h.store.list_envelopes().unwrap().len(), 1);
    let verification = h.runtime.verify_record(RecordKind::Rhpatches, &id).unwrap();
    assert!(verification.all_valid());
    assert_eq!(verification.entries.len(), 2);

    // Signing again replaces alice's entry instead of adding one.
    let again = h.runtime.sign_record(RecordKind::Rhpatches, &id, &alice).unwrap();
    assert_eq!(again.status(), "re-signed");
    assert_eq!(h.store.list_entries(a.envelope_id).unwrap().len(), 2);
    assert_eq!(h.audit.stats().unwrap().new_signatures, 3);
}

#[test]
fn sign_outstanding_only_touches_unsigned_records() {
    let h = Harness::memory(&[
        sample_record(RecordKind::Attachments, "a-1"),
        sample_record(RecordKind::Attachments, "a-2"),
        sample_record(RecordKind::Attachments, "a-3"),
    ]);
    let key = ed25519_signer();
    h.content_signer(&key, "batch");

    h.runtime
        .sign_record(RecordKind::Attachments, &RecordId::new("a-2"), &key)
        .unwrap();
    let report = h.runtime.sign_outstanding(RecordKind::Attachments, &key).unwrap();
    assert_eq!(report.signed, 2);
    assert_eq!(report.already_signed, 1);
    assert!(report.failed.is_empty());

    let report = h.runtime.sign_outstanding(RecordKind::Attachments, &key).unwrap();
    assert_eq!(report.signed, 0);
    assert_eq!(report.already_signed, 3);
}

#[test]
fn content_edit_invalidates_until_resigned() {
    let h = Harness::memory(&[sample_record(RecordKind::Gameversions, "gv-v")]);
    let key = ed25519_signer();
    h.content_signer(&key, "alice");
    let id = RecordId::new("gv-v");
    h.runtime.sign_record(RecordKind::Gameversions, &id, &key).unwrap();

    let before = h.runtime.verify_record(RecordKind::Gameversions, &id).unwrap();
    let mut record = h.store.get_record(RecordKind::Gameversions, &id).unwrap().unwrap();
    record.set("name", "renamed");
    h.store.update_record(&record).unwrap();

    let after = h.runtime.verify_record(RecordKind::Gameversions, &id).unwrap();
    assert!(before.all_valid());
    assert_ne!(before.digest, after.digest);
    assert!(!after.current);
    assert!(!after.all_valid());

    let outcome = h.runtime.sign_record(RecordKind::Gameversions, &id, &key).unwrap();
    assert_eq!(outcome.status(), "archived stale and recreated");
    assert!(h.runtime.verify_record(RecordKind::Gameversions, &id).unwrap().all_valid());
}
