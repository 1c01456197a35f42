//! Signature runtime - wires the components over one store and audit log.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mdsign_audit::AuditLog;
use mdsign_core::{RecordId, RecordKind};
use mdsign_crypto::SigningCapability;
use mdsign_storage::SignatureStore;

use crate::error::RuntimeResult;
use crate::lifecycle::LifecycleManager;
use crate::registry::SignerRegistry;
use crate::response::ResponseSigner;
use crate::signing::{RecordSigner, SignAllReport, SignOutcome};
use crate::sweeper::{SweepReport, Sweeper};
use crate::verify::{RecordVerification, Verifier};

/// Default number of attempts before giving up on a moving record.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for the signature runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Attempts per record when its version keeps moving.
    pub max_attempts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// The signature subsystem over one store and one audit log.
#[derive(Clone)]
pub struct SignatureRuntime {
    store: Arc<dyn SignatureStore>,
    audit: Arc<AuditLog>,
    registry: SignerRegistry,
    lifecycle: LifecycleManager,
    signer: RecordSigner,
    verifier: Verifier,
    config: RuntimeConfig,
}

impl SignatureRuntime {
    /// Create a runtime.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>, audit: Arc<AuditLog>, config: RuntimeConfig) -> Self {
        let registry = SignerRegistry::new(Arc::clone(&store));
        let lifecycle =
            LifecycleManager::new(Arc::clone(&store), Arc::clone(&audit), config.max_attempts);
        let signer = RecordSigner::new(
            Arc::clone(&store),
            registry.clone(),
            lifecycle.clone(),
            config.max_attempts,
        );
        let verifier = Verifier::new(Arc::clone(&store), registry.clone());
        Self {
            store,
            audit,
            registry,
            lifecycle,
            signer,
            verifier,
            config,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SignatureStore> {
        &self.store
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The signer registry.
    #[must_use]
    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    /// The lifecycle manager.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Sign one record. See [`RecordSigner::sign_record`].
    ///
    /// # Errors
    ///
    /// See [`RecordSigner::sign_record`].
    pub fn sign_record(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
        capability: &dyn SigningCapability,
    ) -> RuntimeResult<SignOutcome> {
        self.signer.sign_record(kind, record_id, capability)
    }

    /// Sign every outstanding record of a kind. See
    /// [`RecordSigner::sign_outstanding`].
    ///
    /// # Errors
    ///
    /// See [`RecordSigner::sign_outstanding`].
    pub fn sign_outstanding(
        &self,
        kind: RecordKind,
        capability: &dyn SigningCapability,
    ) -> RuntimeResult<SignAllReport> {
        self.signer.sign_outstanding(kind, capability)
    }

    /// Verify a record's signatures.
    ///
    /// # Errors
    ///
    /// See [`Verifier::verify_record`].
    pub fn verify_record(
        &self,
        kind: RecordKind,
        record_id: &RecordId,
    ) -> RuntimeResult<RecordVerification> {
        self.verifier.verify_record(kind, record_id)
    }

    /// A sweeper over this runtime's store, optionally stoppable.
    #[must_use]
    pub fn sweeper(&self, stop: Option<Arc<AtomicBool>>) -> Sweeper {
        let sweeper = Sweeper::new(Arc::clone(&self.store), self.lifecycle.clone());
        match stop {
            Some(flag) => sweeper.with_stop_flag(flag),
            None => sweeper,
        }
    }

    /// Run one cleanup pass.
    ///
    /// # Errors
    ///
    /// See [`Sweeper::sweep`].
    pub fn sweep(&self, dry_run: bool) -> RuntimeResult<SweepReport> {
        self.sweeper(None).sweep(dry_run)
    }

    /// A response signer using `service` as the wrapping key.
    ///
    /// # Errors
    ///
    /// See [`ResponseSigner::new`].
    pub fn response_signer(
        &self,
        service: Option<Arc<dyn SigningCapability>>,
    ) -> RuntimeResult<ResponseSigner> {
        ResponseSigner::new(Arc::clone(&self.store), self.registry.clone(), service)
    }
}

impl std::fmt::Debug for SignatureRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsign_core::{Record, SignerRole};
    use mdsign_storage::{MemoryStore, RecordStore};
    use mdsign_test::ed25519_signer;

    #[test]
    fn test_default_config() {
        assert_eq!(RuntimeConfig::default().max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_sign_verify_sweep() {
        let store = MemoryStore::shared();
        let runtime = SignatureRuntime::new(
            store.clone(),
            Arc::new(AuditLog::in_memory()),
            RuntimeConfig::default(),
        );
        store
            .insert_record(&Record::new(RecordKind::Patchblobs, "pb-1").with("pbname", "a.bin"))
            .unwrap();

        let key = ed25519_signer();
        runtime
            .registry()
            .register_capability(&key, "content", SignerRole::Content)
            .unwrap();
        let id = RecordId::new("pb-1");
        runtime.sign_record(RecordKind::Patchblobs, &id, &key).unwrap();

        assert!(runtime.verify_record(RecordKind::Patchblobs, &id).unwrap().all_valid());
        let report = runtime.sweep(false).unwrap();
        assert_eq!(report.healthy, 1);
        assert_eq!(runtime.audit().count().unwrap(), 1);
    }
}
