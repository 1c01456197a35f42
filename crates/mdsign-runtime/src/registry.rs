//! Signer registry.
//!
//! Signers are persisted as records of kind `signers`, so the registry is a
//! thin view over the record store. It only ever holds public keys; private
//! material arrives per operation as a [`SigningCapability`].

use std::sync::Arc;

use mdsign_core::{Algorithm, RecordId, RecordKind, SignerId, SignerInfo, SignerRole, Timestamp};
use mdsign_crypto::{PublicKey, SigningCapability};
use mdsign_storage::{RecordStore, SignatureStore, StorageError};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Registry of trusted signers.
#[derive(Clone)]
pub struct SignerRegistry {
    store: Arc<dyn SignatureStore>,
}

impl SignerRegistry {
    /// Create a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>) -> Self {
        Self { store }
    }

    /// Register a signer.
    ///
    /// The public key must parse for the declared algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SignerExists`] if the ID is taken, or a crypto
    /// error if the key does not match the algorithm.
    pub fn register(&self, signer: &SignerInfo) -> RuntimeResult<SignerId> {
        PublicKey::from_bytes(signer.algorithm, &signer.public_key)?;

        if self.find(signer.id)?.is_some() {
            return Err(RuntimeError::SignerExists(signer.id));
        }

        match self.store.insert_record(&signer.to_record()) {
            Ok(()) => {},
            Err(StorageError::AlreadyExists(_)) => {
                return Err(RuntimeError::SignerExists(signer.id));
            },
            Err(e) => return Err(e.into()),
        }

        info!(
            signer_id = %signer.id,
            name = %signer.name,
            algorithm = %signer.algorithm,
            role = %signer.role,
            "Registered signer"
        );
        Ok(signer.id)
    }

    /// Register the public half of a signing capability.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub fn register_capability(
        &self,
        capability: &dyn SigningCapability,
        name: impl Into<String>,
        role: SignerRole,
    ) -> RuntimeResult<SignerInfo> {
        let info = SignerInfo {
            id: capability.signer_id(),
            name: name.into(),
            algorithm: capability.algorithm(),
            public_key: capability.public_key().to_spki_der()?,
            role,
            created_at: Timestamp::now(),
        };
        self.register(&info)?;
        Ok(info)
    }

    /// Look up a signer.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SignerNotFound`] if it is not registered.
    pub fn lookup(&self, id: SignerId) -> RuntimeResult<SignerInfo> {
        self.find(id)?.ok_or(RuntimeError::SignerNotFound(id))
    }

    /// Look up a signer, returning `None` if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored row is malformed.
    pub fn find(&self, id: SignerId) -> RuntimeResult<Option<SignerInfo>> {
        let record = self
            .store
            .get_record(RecordKind::Signers, &RecordId::new(id.to_string()))?;
        Ok(record.as_ref().map(SignerInfo::from_record).transpose()?)
    }

    /// All signers, optionally restricted to one role.
    ///
    /// Rows that cannot be decoded are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list(&self, role: Option<SignerRole>) -> RuntimeResult<Vec<SignerInfo>> {
        let mut signers = Vec::new();
        for id in self.store.list_record_ids(RecordKind::Signers)? {
            let Some(record) = self.store.get_record(RecordKind::Signers, &id)? else {
                continue;
            };
            match SignerInfo::from_record(&record) {
                Ok(info) if role.is_none_or(|r| r == info.role) => signers.push(info),
                Ok(_) => {},
                Err(e) => warn!(signer_id = %id, error = %e, "Skipping malformed signer row"),
            }
        }
        Ok(signers)
    }

    /// Verify `signature` over `message` with the signer's registered key.
    ///
    /// Returns `false` when the algorithm disagrees with the registration or
    /// the signature does not verify.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SignerNotFound`] for unknown signers, or a
    /// crypto error if the stored key no longer parses.
    pub fn verify(
        &self,
        id: SignerId,
        message: &[u8],
        signature: &[u8],
        algorithm: Algorithm,
    ) -> RuntimeResult<bool> {
        let info = self.lookup(id)?;
        if info.algorithm != algorithm {
            debug!(
                signer_id = %id,
                registered = %info.algorithm,
                claimed = %algorithm,
                "Algorithm mismatch"
            );
            return Ok(false);
        }
        let key = PublicKey::from_bytes(info.algorithm, &info.public_key)?;
        Ok(key.verify(message, signature).is_ok())
    }

    /// Check that `capability` belongs to a registered signer, optionally
    /// with the given role, and return that signer.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SignerNotFound`],
    /// [`RuntimeError::CapabilityMismatch`] or [`RuntimeError::WrongRole`].
    pub fn check_capability(
        &self,
        capability: &dyn SigningCapability,
        role: Option<SignerRole>,
    ) -> RuntimeResult<SignerInfo> {
        let info = self.lookup(capability.signer_id())?;

        if info.algorithm != capability.algorithm() {
            return Err(RuntimeError::CapabilityMismatch {
                signer_id: info.id,
                reason: format!(
                    "registered for {}, key is {}",
                    info.algorithm,
                    capability.algorithm()
                ),
            });
        }

        let registered = PublicKey::from_bytes(info.algorithm, &info.public_key)?;
        if registered != capability.public_key() {
            return Err(RuntimeError::CapabilityMismatch {
                signer_id: info.id,
                reason: "public key differs from registration".to_owned(),
            });
        }

        if let Some(expected) = role
            && info.role != expected
        {
            return Err(RuntimeError::WrongRole {
                signer_id: info.id,
                expected,
                actual: info.role,
            });
        }

        Ok(info)
    }
}

impl std::fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsign_storage::MemoryStore;
    use mdsign_test::{ed25519_signer, rsa_signer};

    fn registry() -> SignerRegistry {
        SignerRegistry::new(MemoryStore::shared())
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry();
        let signer = ed25519_signer();
        let info = registry
            .register_capability(&signer, "metadata-bot", SignerRole::Content)
            .unwrap();

        let found = registry.lookup(info.id).unwrap();
        assert_eq!(found.name, "metadata-bot");
        assert_eq!(found.algorithm, Algorithm::Ed25519);
        assert_eq!(found.role, SignerRole::Content);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry();
        let signer = ed25519_signer();
        registry
            .register_capability(&signer, "a", SignerRole::Content)
            .unwrap();
        assert!(matches!(
            registry.register_capability(&signer, "b", SignerRole::Content),
            Err(RuntimeError::SignerExists(_))
        ));
    }

    #[test]
    fn test_key_must_match_algorithm() {
        let registry = registry();
        let info = SignerInfo {
            id: SignerId::new(),
            name: "broken".to_owned(),
            algorithm: Algorithm::RsaPssSha256,
            public_key: vec![1; 32],
            role: SignerRole::Content,
            created_at: Timestamp::now(),
        };
        assert!(matches!(
            registry.register(&info),
            Err(RuntimeError::CryptoError(_))
        ));
        assert!(registry.find(info.id).unwrap().is_none());
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(matches!(
            registry().lookup(SignerId::new()),
            Err(RuntimeError::SignerNotFound(_))
        ));
    }

    #[test]
    fn test_verify_both_algorithms() {
        let registry = registry();
        for signer in [ed25519_signer(), rsa_signer()] {
            registry
                .register_capability(&signer, "s", SignerRole::Content)
                .unwrap();
            let sig = signer.sign(b"digest").unwrap();
            let id = signer.signer_id();
            let alg = signer.algorithm();

            assert!(registry.verify(id, b"digest", &sig, alg).unwrap());
            assert!(!registry.verify(id, b"other", &sig, alg).unwrap());
        }
    }

    #[test]
    fn test_verify_rejects_wrong_algorithm_claim() {
        let registry = registry();
        let signer = ed25519_signer();
        registry
            .register_capability(&signer, "s", SignerRole::Content)
            .unwrap();
        let sig = signer.sign(b"digest").unwrap();
        assert!(
            !registry
                .verify(signer.signer_id(), b"digest", &sig, Algorithm::RsaPssSha256)
                .unwrap()
        );
    }

    #[test]
    fn test_list_filters_by_role() {
        let registry = registry();
        registry
            .register_capability(&ed25519_signer(), "content", SignerRole::Content)
            .unwrap();
        registry
            .register_capability(&ed25519_signer(), "service", SignerRole::Service)
            .unwrap();

        assert_eq!(registry.list(None).unwrap().len(), 2);
        let services = registry.list(Some(SignerRole::Service)).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "service");
    }

    #[test]
    fn test_check_capability() {
        let registry = registry();
        let signer = ed25519_signer();
        registry
            .register_capability(&signer, "s", SignerRole::Content)
            .unwrap();

        assert!(
            registry
                .check_capability(&signer, Some(SignerRole::Content))
                .is_ok()
        );
        assert!(matches!(
            registry.check_capability(&signer, Some(SignerRole::Service)),
            Err(RuntimeError::WrongRole { .. })
        ));

        // Same signer ID, different key.
        let impostor = mdsign_test::ed25519_signer_with_id(signer.signer_id());
        assert!(matches!(
            registry.check_capability(&impostor, None),
            Err(RuntimeError::CapabilityMismatch { .. })
        ));
    }
}
