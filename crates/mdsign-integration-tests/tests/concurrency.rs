//! Signers and sweeps racing on the same record.

mod common;

use std::sync::Barrier;
use std::thread;

use common::Harness;
use mdsign_core::{RecordId, RecordKind};
use mdsign_crypto::SigningCapability;
use mdsign_runtime::SignOutcome;
use mdsign_storage::{EnvelopeStore, RecordStore};
use mdsign_test::{ed25519_signer, sample_record};

const RECORD: &str = "rhp-race";

fn harnesses() -> Vec<(&'static str, Harness)> {
    let records = [sample_record(RecordKind::Rhpatches, RECORD)];
    vec![
        ("memory", Harness::memory(&records)),
        ("sqlite", Harness::sqlite(&records)),
    ]
}

/// Exactly one envelope exists, the record points at it, and it holds one
/// valid entry per signer.
fn assert_converged(backend: &str, h: &Harness, outcomes: &[SignOutcome], signers: usize) {
    let id = RecordId::new(RECORD);
    let envelopes = h.store.list_envelopes().unwrap();
    assert_eq!(envelopes.len(), 1, "{backend}: leftover envelopes {envelopes:?}");
    let envelope = &envelopes[0];

    let record = h.store.get_record(RecordKind::Rhpatches, &id).unwrap().unwrap();
    assert_eq!(record.reference().unwrap(), Some(envelope.id), "{backend}");
    assert!(
        outcomes.iter().all(|o| o.envelope_id == envelope.id),
        "{backend}: signers landed in different envelopes"
    );
    assert_eq!(h.store.list_entries(envelope.id).unwrap().len(), signers, "{backend}");

    let verification = h.runtime.verify_record(RecordKind::Rhpatches, &id).unwrap();
    assert!(verification.all_valid(), "{backend}");
    assert_eq!(verification.entries.len(), signers, "{backend}");
}

#[test]
fn concurrent_signers_converge_on_one_envelope() {
    for (backend, h) in harnesses() {
        let keys = [ed25519_signer(), ed25519_signer()];
        for (i, key) in keys.iter().enumerate() {
            h.content_signer(key, &format!("signer-{i}"));
        }
        let barrier = Barrier::new(keys.len());
        let id = RecordId::new(RECORD);

        let outcomes: Vec<SignOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = keys
                .iter()
                .map(|key| {
                    let (runtime, barrier, id) = (&h.runtime, &barrier, &id);
                    scope.spawn(move || {
                        barrier.wait();
                        runtime.sign_record(RecordKind::Rhpatches, id, key)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });

        assert_converged(backend, &h, &outcomes, keys.len());
        let signed: Vec<_> = keys.iter().map(|k| k.signer_id()).collect();
        let entries = h.store.list_entries(outcomes[0].envelope_id).unwrap();
        assert!(signed.iter().all(|s| entries.iter().any(|e| e.signer_id == *s)), "{backend}");
        // Nothing became stale, so nothing was archived.
        assert_eq!(h.audit.stats().unwrap().archived, 0, "{backend}");
    }
}

#[test]
fn sweep_during_signing_never_drops_current_envelope() {
    for (backend, h) in harnesses() {
        let keys = [ed25519_signer(), ed25519_signer()];
        for (i, key) in keys.iter().enumerate() {
            h.content_signer(key, &format!("signer-{i}"));
        }
        let barrier = Barrier::new(keys.len().saturating_add(1));
        let id = RecordId::new(RECORD);

        let outcomes: Vec<SignOutcome> = thread::scope(|scope| {
            let sweeper = scope.spawn(|| {
                barrier.wait();
                h.runtime.sweep(false)
            });
            let handles: Vec<_> = keys
                .iter()
                .map(|key| {
                    let (runtime, barrier, id) = (&h.runtime, &barrier, &id);
                    scope.spawn(move || {
                        barrier.wait();
                        runtime.sign_record(RecordKind::Rhpatches, id, key)
                    })
                })
                .collect();
            let outcomes: Vec<SignOutcome> = handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect();
            let report = sweeper.join().unwrap().unwrap();
            assert_eq!(report.failed, 0, "{backend}: {report:?}");
            outcomes
        });

        assert_converged(backend, &h, &outcomes, keys.len());

        // A later pass finds only the healthy envelope.
        let report = h.runtime.sweep(false).unwrap();
        assert_eq!(report.scanned, 1, "{backend}");
        assert_eq!(report.healthy, 1, "{backend}");
    }
}
