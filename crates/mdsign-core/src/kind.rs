//! The fixed table of signable record kinds.
//!
//! Each kind names its table, primary key and the fields that never take
//! part in the canonical form. The table is versioned: any change to an
//! exclusion list changes every canonical string of that kind, so it must
//! come with a bump of [`CANONICAL_FORMAT_VERSION`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Version of the canonical serialization rules and exclusion table.
pub const CANONICAL_FORMAT_VERSION: u32 = 1;

/// Field on every signable record that points at its current envelope.
pub const REFERENCE_FIELD: &str = "siglistuuid";

/// Field on every signable record holding the storage-managed row version.
pub const VERSION_FIELD: &str = "row_version";

/// Signature artifacts that are never part of the signed content.
pub const SIGNATURE_ARTIFACT_FIELDS: &[&str] = &[
    "signature",
    "signatures",
    "mdsignatures",
    "record_signatures",
    "server_signature",
];

/// Which database file holds a kind's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    /// Attachment, blob and signer data (also holds the signature tables).
    Patchbin,
    /// Game and patch metadata.
    Rhdata,
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patchbin => write!(f, "patchbin"),
            Self::Rhdata => write!(f, "rhdata"),
        }
    }
}

/// A large payload field whose content is already pinned by a hash field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoveredPayload {
    /// The payload field that is dropped.
    pub field: &'static str,
    /// The hash field that stays in the canonical form.
    pub hash_field: &'static str,
}

/// Static description of one record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSpec {
    /// The kind described.
    pub kind: RecordKind,
    /// Table name.
    pub table: &'static str,
    /// Primary-key column.
    pub primary_key: &'static str,
    /// Database holding the table.
    pub database: Database,
    /// Bookkeeping fields that change without changing meaning.
    pub volatile_fields: &'static [&'static str],
    /// Payloads represented by a hash field.
    pub covered_payloads: &'static [CoveredPayload],
}

impl KindSpec {
    /// Whether `field` is left out of this kind's canonical form.
    #[must_use]
    pub fn is_excluded(&self, field: &str) -> bool {
        field == REFERENCE_FIELD
            || SIGNATURE_ARTIFACT_FIELDS.contains(&field)
            || self.volatile_fields.contains(&field)
            || self.covered_payloads.iter().any(|p| p.field == field)
    }
}

/// A signable record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Game versions.
    Gameversions,
    /// Encrypted patch blobs.
    Patchblobs,
    /// Patch metadata.
    Rhpatches,
    /// Binary attachments.
    Attachments,
    /// Signer identities.
    Signers,
}

static KIND_TABLE: [KindSpec; 5] = [
    KindSpec {
        kind: RecordKind::Gameversions,
        table: "gameversions",
        primary_key: "gvuuid",
        database: Database::Rhdata,
        volatile_fields: &["gvimport_time", "import_time", "updated_time"],
        covered_payloads: &[],
    },
    KindSpec {
        kind: RecordKind::Patchblobs,
        table: "patchblobs",
        primary_key: "pbuuid",
        database: Database::Patchbin,
        volatile_fields: &["pbimport_time", "import_time", "updated_time"],
        covered_payloads: &[CoveredPayload {
            field: "pblobdata",
            hash_field: "decoded_hash_sha256",
        }],
    },
    KindSpec {
        kind: RecordKind::Rhpatches,
        table: "rhpatches",
        primary_key: "rhpuuid",
        database: Database::Rhdata,
        volatile_fields: &["import_time", "updated_time"],
        covered_payloads: &[],
    },
    KindSpec {
        kind: RecordKind::Attachments,
        table: "attachments",
        primary_key: "auuid",
        database: Database::Patchbin,
        volatile_fields: &["import_time", "updated_time", "last_search"],
        covered_payloads: &[CoveredPayload {
            field: "file_data",
            hash_field: "file_hash_sha256",
        }],
    },
    KindSpec {
        kind: RecordKind::Signers,
        table: "signers",
        primary_key: "signeruuid",
        database: Database::Patchbin,
        volatile_fields: &["import_time", "updated_time"],
        covered_payloads: &[],
    },
];

impl RecordKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 5] = [
        Self::Gameversions,
        Self::Patchblobs,
        Self::Rhpatches,
        Self::Attachments,
        Self::Signers,
    ];

    /// The persisted name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.spec().table
    }

    /// The static description of this kind.
    #[must_use]
    pub fn spec(&self) -> &'static KindSpec {
        match self {
            Self::Gameversions => &KIND_TABLE[0],
            Self::Patchblobs => &KIND_TABLE[1],
            Self::Rhpatches => &KIND_TABLE[2],
            Self::Attachments => &KIND_TABLE[3],
            Self::Signers => &KIND_TABLE[4],
        }
    }

    /// Look up a kind by its persisted name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKind`] for names outside the table.
    pub fn parse(name: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| CoreError::UnknownKind(name.to_owned()))
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}
