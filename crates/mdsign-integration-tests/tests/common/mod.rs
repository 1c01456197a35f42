//! Shared test harness for integration tests.

use std::sync::Arc;

use mdsign_audit::AuditLog;
use mdsign_core::{Record, SignerRole};
use mdsign_crypto::LocalSigner;
use mdsign_runtime::{RuntimeConfig, SignatureRuntime};
use mdsign_storage::{RecordStore, SignatureStore, SqliteConfig, SqliteStore};
use tempfile::TempDir;

/// A runtime wired to a store and an in-memory audit log.
///
/// For the SQLite variant the harness owns the `TempDir` holding both
/// database files; it is cleaned up when the harness is dropped.
#[allow(dead_code)]
pub struct Harness {
    /// The runtime under test.
    pub runtime: SignatureRuntime,
    /// The same store the runtime uses, for direct record edits.
    pub store: Arc<dyn SignatureStore>,
    /// The audit log the runtime writes to.
    pub audit: Arc<AuditLog>,
    _dir: Option<TempDir>,
}

#[allow(dead_code)]
impl Harness {
    /// In-memory store holding `records`.
    pub fn memory(records: &[Record]) -> Self {
        let store: Arc<dyn SignatureStore> = mdsign_test::seeded_store(records);
        Self::with_store(store, None)
    }

    /// SQLite store with separate patchbin and rhdata files.
    pub fn sqlite(records: &[Record]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("patchbin.db"))
            .with_rhdata(dir.path().join("rhdata.db"));
        let store: Arc<dyn SignatureStore> = Arc::new(SqliteStore::open(&config).unwrap());
        for record in records {
            store.insert_record(record).unwrap();
        }
        Self::with_store(store, Some(dir))
    }

    fn with_store(store: Arc<dyn SignatureStore>, dir: Option<TempDir>) -> Self {
        let audit = Arc::new(AuditLog::in_memory());
        let runtime = SignatureRuntime::new(
            Arc::clone(&store),
            Arc::clone(&audit),
            RuntimeConfig::default(),
        );
        Self {
            runtime,
            store,
            audit,
            _dir: dir,
        }
    }

    /// Register `key` as a content signer.
    pub fn content_signer(&self, key: &LocalSigner, name: &str) {
        self.runtime
            .registry()
            .register_capability(key, name, SignerRole::Content)
            .unwrap();
    }

    /// Register `key` as a service signer.
    pub fn service_signer(&self, key: &LocalSigner, name: &str) {
        self.runtime
            .registry()
            .register_capability(key, name, SignerRole::Service)
            .unwrap();
    }
}
