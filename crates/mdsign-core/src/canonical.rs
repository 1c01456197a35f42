//! Canonical serialization of records for signing.
//!
//! The canonical form of a record is built from the fields that survive the
//! kind's exclusion table, sorted by name in byte order and written as
//! `name=value` pairs joined with `&`. `NULL` is the literal `null`, blobs
//! are lowercase hex and every other value uses its natural string form.
//!
//! # Example
//!
//! ```
//! use mdsign_core::{Record, RecordKind, canonicalize};
//!
//! let record = Record::new(RecordKind::Gameversions, "gv-1")
//!     .with("name", "Super Demo World")
//!     .with("gvimport_time", "2024-01-01 00:00:00");
//!
//! let canonical = canonicalize(&record);
//! assert_eq!(
//!     canonical.as_str(),
//!     "gvuuid=gv-1&name=Super Demo World&row_version=1"
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreResult;
use crate::kind::{KindSpec, RecordKind};
use crate::record::{FieldValue, Record};

/// The canonical string of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm(String);

impl CanonicalForm {
    /// The canonical bytes (UTF-8).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for CanonicalForm {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Canonicalize a record of a known kind.
#[must_use]
pub fn canonicalize(record: &Record) -> CanonicalForm {
    render(record.kind().spec(), record.fields())
}

/// Canonicalize loose fields under a kind given by name.
///
/// # Errors
///
/// Returns [`crate::CoreError::UnknownKind`] if `kind` is not in the table.
pub fn canonicalize_fields(
    kind: &str,
    fields: &BTreeMap<String, FieldValue>,
) -> CoreResult<CanonicalForm> {
    let kind = RecordKind::parse(kind)?;
    Ok(render(kind.spec(), fields))
}

/// The retained fields of a record as a JSON object.
///
/// This is the "clean" snapshot stored in audit entries: exactly the fields
/// the signature covers.
#[must_use]
pub fn clean_snapshot(record: &Record) -> serde_json::Map<String, serde_json::Value> {
    let spec = record.kind().spec();
    record
        .fields()
        .iter()
        .filter(|(name, _)| !spec.is_excluded(name))
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

fn render(spec: &KindSpec, fields: &BTreeMap<String, FieldValue>) -> CanonicalForm {
    let mut out = String::new();
    for (name, value) in fields.iter().filter(|(name, _)| !spec.is_excluded(name)) {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(name);
        out.push('=');
        out.push_str(&value.to_string());
    }
    CanonicalForm(out)
}
