//! Records: named fields of one kind, as read from storage.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::kind::{REFERENCE_FIELD, RecordKind, VERSION_FIELD};
use crate::types::{EnvelopeId, RecordId, Timestamp};

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Text.
    Text(String),
    /// Boolean.
    Bool(bool),
    /// Point in time.
    Timestamp(Timestamp),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl FieldValue {
    /// Whether this is [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer content, if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// JSON rendering used for record snapshots.
    ///
    /// Blobs become lowercase hex and timestamps RFC 3339, matching the
    /// canonical string.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Real(r) => serde_json::json!(r),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Self::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
        }
    }
}

/// Natural string form, as used on the right-hand side of a canonical pair.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            Self::Blob(bytes) => f.write_str(&hex::encode(bytes)),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Blob(bytes)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A record of a known kind.
///
/// Fields are kept in a `BTreeMap`, so iteration is already in the byte
/// order the canonical form needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// A fresh record at row version 1 with no envelope reference.
    #[must_use]
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            kind.spec().primary_key.to_owned(),
            FieldValue::Text(id.into()),
        );
        fields.insert(VERSION_FIELD.to_owned(), FieldValue::Integer(1));
        fields.insert(REFERENCE_FIELD.to_owned(), FieldValue::Null);
        Self { kind, fields }
    }

    /// Wrap fields read from storage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] if the primary key is absent.
    pub fn from_fields(kind: RecordKind, fields: BTreeMap<String, FieldValue>) -> CoreResult<Self> {
        let pk = kind.spec().primary_key;
        if !fields.contains_key(pk) {
            return Err(CoreError::MissingField {
                kind: kind.to_string(),
                field: pk.to_owned(),
            });
        }
        Ok(Self { kind, fields })
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The record kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// All fields, sorted by name.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// The primary-key value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key field is missing or not text/integer.
    pub fn id(&self) -> CoreResult<RecordId> {
        let pk = self.kind.spec().primary_key;
        match self.fields.get(pk) {
            Some(FieldValue::Text(s)) => Ok(RecordId(s.clone())),
            Some(FieldValue::Integer(n)) => Ok(RecordId(n.to_string())),
            Some(other) => Err(CoreError::InvalidField {
                field: pk.to_owned(),
                reason: format!("primary key must be text or integer, got {other:?}"),
            }),
            None => Err(self.missing(pk)),
        }
    }

    /// The storage-managed row version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version field is missing, not an integer, or
    /// below 1.
    pub fn row_version(&self) -> CoreResult<u64> {
        let value = self
            .fields
            .get(VERSION_FIELD)
            .ok_or_else(|| self.missing(VERSION_FIELD))?;
        let n = value.as_integer().ok_or_else(|| CoreError::InvalidField {
            field: VERSION_FIELD.to_owned(),
            reason: format!("expected integer, got {value:?}"),
        })?;
        match u64::try_from(n) {
            Ok(v) if v >= 1 => Ok(v),
            _ => Err(CoreError::InvalidField {
                field: VERSION_FIELD.to_owned(),
                reason: format!("row version must be at least 1, got {n}"),
            }),
        }
    }

    /// Overwrite the row version. Only storage backends should call this.
    pub fn set_row_version(&mut self, version: u64) {
        let n = i64::try_from(version).unwrap_or(i64::MAX);
        self.fields
            .insert(VERSION_FIELD.to_owned(), FieldValue::Integer(n));
    }

    /// The envelope this record currently points at, if any.
    ///
    /// A missing field and `NULL` both mean "no envelope".
    ///
    /// # Errors
    ///
    /// Returns an error if the field holds something other than a UUID.
    pub fn reference(&self) -> CoreResult<Option<EnvelopeId>> {
        match self.fields.get(REFERENCE_FIELD) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Text(s)) if s.is_empty() => Ok(None),
            Some(FieldValue::Text(s)) => s.parse().map(Some),
            Some(other) => Err(CoreError::InvalidField {
                field: REFERENCE_FIELD.to_owned(),
                reason: format!("expected envelope id, got {other:?}"),
            }),
        }
    }

    /// Point the record at an envelope (or clear the pointer).
    pub fn set_reference(&mut self, envelope: Option<EnvelopeId>) {
        let value = envelope.map_or(FieldValue::Null, |id| FieldValue::Text(id.to_string()));
        self.fields.insert(REFERENCE_FIELD.to_owned(), value);
    }

    fn missing(&self, field: &str) -> CoreError {
        CoreError::MissingField {
            kind: self.kind.to_string(),
            field: field.to_owned(),
        }
    }
}
