//! Signer identities, algorithms and roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::kind::RecordKind;
use crate::record::{FieldValue, Record};
use crate::types::{SignerId, Timestamp};

/// Signature algorithm of a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Ed25519 over the SHA-256 digest of the message.
    #[serde(rename = "ED25519")]
    Ed25519,
    /// RSA-PSS with SHA-256 over the SHA-256 digest of the message.
    #[serde(rename = "RSA")]
    RsaPssSha256,
}

impl Algorithm {
    /// The persisted name (`ED25519` or `RSA`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ED25519",
            Self::RsaPssSha256 => "RSA",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ED25519" => Ok(Self::Ed25519),
            "RSA" | "RSA-PSS" | "RSA-PSS-SHA256" => Ok(Self::RsaPssSha256),
            _ => Err(CoreError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// Hash applied to canonical bytes before signing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
}

impl HashAlgorithm {
    /// The persisted name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            _ => Err(CoreError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// What a signer is trusted to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerRole {
    /// Signs record content.
    #[serde(rename = "metadata")]
    Content,
    /// Signs outbound responses.
    #[serde(rename = "server")]
    Service,
}

impl SignerRole {
    /// The persisted name (`metadata` or `server`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "metadata",
            Self::Service => "server",
        }
    }
}

impl fmt::Display for SignerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerRole {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metadata" | "content" => Ok(Self::Content),
            "server" | "service" => Ok(Self::Service),
            _ => Err(CoreError::UnknownRole(s.to_owned())),
        }
    }
}

/// A registered signer. Holds public material only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Signer ID.
    pub id: SignerId,
    /// Human-readable name.
    pub name: String,
    /// The one algorithm this signer uses.
    pub algorithm: Algorithm,
    /// Public key bytes: SPKI DER, or the raw 32-byte key for Ed25519.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// Role.
    pub role: SignerRole,
    /// When the signer was registered.
    pub created_at: Timestamp,
}

impl SignerInfo {
    /// Public key as lowercase hex.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    /// Row representation in the `signers` table.
    ///
    /// Signers are records themselves, so they can be signed like any other
    /// kind.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new(RecordKind::Signers, self.id.to_string())
            .with("signer_type", self.role.as_str())
            .with("signer_name", self.name.clone())
            .with("publickey", self.public_key_hex())
            .with("publickey_type", self.algorithm.as_str())
            .with("hashtype", HashAlgorithm::Sha256.as_str())
            .with("created_at", self.created_at)
    }

    /// Rebuild a signer from its `signers` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not a signer row or a column is
    /// malformed.
    pub fn from_record(record: &Record) -> CoreResult<Self> {
        if record.kind() != RecordKind::Signers {
            return Err(CoreError::InvalidField {
                field: "kind".to_owned(),
                reason: format!("expected signers record, got {}", record.kind()),
            });
        }

        let id: SignerId = record.id()?.as_str().parse()?;
        let public_key = hex::decode(text_field(record, "publickey")?).map_err(|e| CoreError::InvalidField {
            field: "publickey".to_owned(),
            reason: e.to_string(),
        })?;
        let created_at = match record.get("created_at") {
            Some(FieldValue::Timestamp(ts)) => *ts,
            Some(FieldValue::Text(s)) => Timestamp::parse(s)?,
            _ => Timestamp::now(),
        };

        Ok(Self {
            id,
            name: text_field(record, "signer_name")?.to_owned(),
            algorithm: text_field(record, "publickey_type")?.parse()?,
            public_key,
            role: text_field(record, "signer_type")?.parse()?,
            created_at,
        })
    }
}

fn text_field<'a>(record: &'a Record, field: &str) -> CoreResult<&'a str> {
    record
        .get(field)
        .and_then(FieldValue::as_text)
        .ok_or_else(|| CoreError::MissingField {
            kind: RecordKind::Signers.to_string(),
            field: field.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SignerInfo {
        SignerInfo {
            id: SignerId::new(),
            name: "metadata-bot".to_owned(),
            algorithm: Algorithm::Ed25519,
            public_key: vec![7; 32],
            role: SignerRole::Content,
            created_at: Timestamp::parse("2024-01-02T03:04:05Z").unwrap(),
        }
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("ed25519".parse::<Algorithm>().unwrap(), Algorithm::Ed25519);
        assert_eq!("RSA".parse::<Algorithm>().unwrap(), Algorithm::RsaPssSha256);
        assert_eq!(
            "rsa-pss-sha256".parse::<Algorithm>().unwrap(),
            Algorithm::RsaPssSha256
        );
        assert!(matches!(
            "ECDSA".parse::<Algorithm>(),
            Err(CoreError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_role_parse_accepts_both_vocabularies() {
        assert_eq!("metadata".parse::<SignerRole>().unwrap(), SignerRole::Content);
        assert_eq!("service".parse::<SignerRole>().unwrap(), SignerRole::Service);
        assert!("admin".parse::<SignerRole>().is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let info = signer();
        let record = info.to_record();
        assert_eq!(record.get("publickey_type").unwrap().as_text(), Some("ED25519"));
        assert_eq!(SignerInfo::from_record(&record).unwrap(), info);
    }

    #[test]
    fn test_from_record_rejects_other_kinds() {
        let record = Record::new(RecordKind::Attachments, "a");
        assert!(SignerInfo::from_record(&record).is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(signer()).unwrap();
        assert_eq!(json["algorithm"], "ED25519");
        assert_eq!(json["role"], "metadata");
        assert_eq!(json["public_key"], hex::encode([7_u8; 32]));
    }
}
