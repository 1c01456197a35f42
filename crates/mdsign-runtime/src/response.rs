//! Response signing.
//!
//! A response is a JSON object. The signer embeds the current signatures of
//! the records it mentions, stamps it, and signs the SHA-256 of its compact
//! key-sorted serialization with the service signer's key.

use std::sync::Arc;

use mdsign_core::{Algorithm, RecordId, RecordKind, SignerId, SignerRole, Timestamp};
use mdsign_crypto::{ContentHash, SigningCapability};
use mdsign_storage::{EnvelopeStore, RecordStore, SignatureStore};
use serde_json::{Map, Value, json};
use tracing::{debug, info_span};

use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::SignerRegistry;

/// Field holding the embedded per-record signatures.
pub const RECORD_SIGNATURES_FIELD: &str = "record_signatures";
/// Field holding the response timestamp.
pub const TIMESTAMP_FIELD: &str = "response_timestamp";
/// Field holding the wrapping signature.
pub const SERVER_SIGNATURE_FIELD: &str = "server_signature";

/// Wraps outbound payloads with record signatures and a service signature.
#[derive(Clone)]
pub struct ResponseSigner {
    store: Arc<dyn SignatureStore>,
    registry: SignerRegistry,
    service: Option<Arc<dyn SigningCapability>>,
}

impl ResponseSigner {
    /// Create a response signer.
    ///
    /// Without a service capability responses are still stamped and carry
    /// record signatures, but no `server_signature`.
    ///
    /// # Errors
    ///
    /// Returns a registry error if the capability is not a registered
    /// service signer.
    pub fn new(
        store: Arc<dyn SignatureStore>,
        registry: SignerRegistry,
        service: Option<Arc<dyn SigningCapability>>,
    ) -> RuntimeResult<Self> {
        if let Some(capability) = &service {
            registry.check_capability(capability.as_ref(), Some(SignerRole::Service))?;
        }
        Ok(Self {
            store,
            registry,
            service,
        })
    }

    /// Whether responses get a `server_signature`.
    #[must_use]
    pub fn has_service_signer(&self) -> bool {
        self.service.is_some()
    }

    /// Sign `payload`, embedding signatures for `records`.
    ///
    /// Records without a current envelope, or with an empty one, are left
    /// out of `record_signatures`; the field is omitted when nothing is left.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidResponse`] if `payload` is not an
    /// object, or a store or signing error.
    pub fn sign_response(
        &self,
        payload: Value,
        records: &[(RecordKind, RecordId)],
    ) -> RuntimeResult<Value> {
        let _span = info_span!("sign_response", records = records.len()).entered();
        let Value::Object(mut body) = payload else {
            return Err(RuntimeError::InvalidResponse(
                "payload must be a JSON object".to_owned(),
            ));
        };
        body.remove(SERVER_SIGNATURE_FIELD);

        let mut embedded = Map::new();
        for (kind, record_id) in records {
            if let Some(block) = self.record_block(*kind, record_id)? {
                embedded.insert(record_signatures_key(*kind, record_id), block);
            }
        }
        if !embedded.is_empty() {
            body.insert(RECORD_SIGNATURES_FIELD.to_owned(), Value::Object(embedded));
        }
        body.insert(
            TIMESTAMP_FIELD.to_owned(),
            Value::String(Timestamp::now().to_rfc3339()),
        );

        let Some(service) = &self.service else {
            debug!("No service signer configured, response left unsigned");
            return Ok(Value::Object(body));
        };

        let digest = response_digest(&body)?;
        let signature = service.sign(digest.as_bytes())?;
        body.insert(
            SERVER_SIGNATURE_FIELD.to_owned(),
            json!({
                "signer_id": service.signer_id().to_string(),
                "signature": hex::encode(signature),
                "algorithm": service.algorithm().as_str(),
                "hash": digest.to_hex(),
            }),
        );
        debug!(signer_id = %service.signer_id(), hash = %digest, "Signed response");
        Ok(Value::Object(body))
    }

    /// Check a response's `server_signature`.
    ///
    /// Returns `false` when the field is missing or malformed, when the
    /// embedded hash does not match the body, when the signer is unknown or
    /// not a service signer, or when the signature does not verify.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidResponse`] if `response` is not an
    /// object, or a store error.
    pub fn verify_response(&self, response: &Value) -> RuntimeResult<bool> {
        let Value::Object(body) = response else {
            return Err(RuntimeError::InvalidResponse(
                "response must be a JSON object".to_owned(),
            ));
        };
        let Some(claim) = body.get(SERVER_SIGNATURE_FIELD).and_then(ServerSignature::parse) else {
            return Ok(false);
        };

        let mut unsigned = body.clone();
        unsigned.remove(SERVER_SIGNATURE_FIELD);
        let digest = response_digest(&unsigned)?;
        if !digest.ct_eq(&claim.hash) {
            debug!("Response hash mismatch");
            return Ok(false);
        }

        match self.registry.find(claim.signer_id)? {
            Some(info) if info.role == SignerRole::Service => {},
            _ => return Ok(false),
        }
        self.registry.verify(
            claim.signer_id,
            digest.as_bytes(),
            &claim.signature,
            claim.algorithm,
        )
    }

    fn record_block(&self, kind: RecordKind, record_id: &RecordId) -> RuntimeResult<Option<Value>> {
        let Some(record) = self.store.get_record(kind, record_id)? else {
            return Ok(None);
        };
        let Some(envelope_id) = record.reference()? else {
            return Ok(None);
        };
        let Some(envelope) = self.store.get_envelope(envelope_id)? else {
            return Ok(None);
        };
        if !envelope.is_current_for(&record)? {
            return Ok(None);
        }
        let entries = self.store.list_entries(envelope.id)?;
        if entries.is_empty() {
            return Ok(None);
        }

        let mut signatures = Vec::with_capacity(entries.len());
        for entry in entries {
            let signer = self.registry.find(entry.signer_id)?;
            signatures.push(json!({
                "signer_id": entry.signer_id.to_string(),
                "signer_name": signer.as_ref().map(|s| s.name.clone()),
                "signer_type": signer.as_ref().map(|s| s.role.as_str()),
                "signature": entry.signature_hex(),
                "algorithm": entry.algorithm.as_str(),
                "hash_algorithm": entry.hash_algorithm.as_str(),
                "signed_at": entry.signed_at.to_rfc3339(),
            }));
        }

        Ok(Some(json!({
            "record_type": kind.as_str(),
            "siglistuuid": envelope.id.to_string(),
            "signed_row_version": envelope.signed_row_version,
            "signatures": signatures,
        })))
    }
}

impl std::fmt::Debug for ResponseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSigner")
            .field("service_signer", &self.service.as_ref().map(|s| s.signer_id()))
            .finish_non_exhaustive()
    }
}

struct ServerSignature {
    signer_id: SignerId,
    signature: Vec<u8>,
    algorithm: Algorithm,
    hash: ContentHash,
}

impl ServerSignature {
    fn parse(value: &Value) -> Option<Self> {
        Some(Self {
            signer_id: text(value, "signer_id")?.parse().ok()?,
            signature: hex::decode(text(value, "signature")?).ok()?,
            algorithm: text(value, "algorithm")?.parse().ok()?,
            hash: ContentHash::from_hex(text(value, "hash")?).ok()?,
        })
    }
}

/// Key of a record's block in `record_signatures`: `<kind>/<record id>`.
#[must_use]
pub fn record_signatures_key(kind: RecordKind, record_id: &RecordId) -> String {
    format!("{}/{record_id}", kind.as_str())
}

fn text<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

/// SHA-256 of `body` serialized as compact JSON with every object's keys
/// in sorted order.
///
/// `serde_json` is built without `preserve_order`, so [`Map`] is ordered by
/// key and plain serialization is already sorted.
///
/// # Errors
///
/// Returns a serialization error if the body cannot be encoded.
pub fn response_digest(body: &Map<String, Value>) -> RuntimeResult<ContentHash> {
    Ok(ContentHash::hash(&serde_json::to_vec(body)?))
}
