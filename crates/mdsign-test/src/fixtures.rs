//! Keys, signers and records.

use std::sync::Arc;

use mdsign_core::{Algorithm, Record, RecordKind, SignerId, SignerInfo, SignerRole, Timestamp};
use mdsign_crypto::{KeyEncoding, Keyfile, LocalSigner, PrivateKey, SigningCapability};
use mdsign_storage::{MemoryStore, RecordStore};

/// RSA modulus used in tests. Small enough to generate quickly.
pub const TEST_RSA_BITS: usize = 1024;

/// A fresh Ed25519 signer with a random ID.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn ed25519_signer() -> LocalSigner {
    ed25519_signer_with_id(SignerId::new())
}

/// A fresh Ed25519 signer claiming `id`.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn ed25519_signer_with_id(id: SignerId) -> LocalSigner {
    let key = PrivateKey::generate(Algorithm::Ed25519).expect("ed25519 keygen");
    LocalSigner::new(id, key)
}

/// A fresh RSA-PSS signer with a [`TEST_RSA_BITS`] modulus.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn rsa_signer() -> LocalSigner {
    let key = PrivateKey::generate_rsa(TEST_RSA_BITS).expect("rsa keygen");
    LocalSigner::new(SignerId::new(), key)
}

/// The registry row for `signer`.
///
/// # Panics
///
/// Panics if the public key cannot be encoded.
#[must_use]
pub fn signer_info(signer: &LocalSigner, name: &str, role: SignerRole) -> SignerInfo {
    SignerInfo {
        id: signer.signer_id(),
        name: name.to_owned(),
        algorithm: signer.algorithm(),
        public_key: signer.public_key().to_spki_der().expect("spki encoding"),
        role,
        created_at: Timestamp::now(),
    }
}

/// Keyfile text for `signer` with both private key encodings.
///
/// # Panics
///
/// Panics if the key cannot be encoded.
#[must_use]
pub fn keyfile_text(signer: &LocalSigner, name: &str, role: SignerRole) -> String {
    Keyfile::render(signer, name, role, KeyEncoding::Both)
        .expect("keyfile render")
        .to_string()
}

/// A record of `kind` with a few realistic content fields.
#[must_use]
pub fn sample_record(kind: RecordKind, id: &str) -> Record {
    let record = Record::new(kind, id);
    match kind {
        RecordKind::Gameversions => record
            .with("gameid", "kaizo-demo")
            .with("name", "Kaizo Demo")
            .with("version", 1_i64)
            .with("difficulty", "Kaizo: Light"),
        RecordKind::Patchblobs => record
            .with("pbname", format!("{id}.bin"))
            .with("pat_sha256", "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")
            .with("size", 1024_i64),
        RecordKind::Rhpatches => record
            .with("patch_name", format!("{id}.bps"))
            .with("gvuuid", "gv-1"),
        RecordKind::Attachments => record
            .with("file_name", format!("{id}.zip"))
            .with("file_size", 2048_i64),
        RecordKind::Signers => record
            .with("signer_name", "fixture")
            .with("signer_type", "metadata"),
    }
}

/// An in-memory store holding `records`.
///
/// # Panics
///
/// Panics if a record cannot be inserted (e.g. duplicate IDs).
#[must_use]
pub fn seeded_store(records: &[Record]) -> Arc<MemoryStore> {
    let store = MemoryStore::shared();
    for record in records {
        store.insert_record(record).expect("seed record");
    }
    store
}
