//! SQLite backend.
//!
//! Signature state lives in the `patchbin` database next to the
//! `attachments`, `patchblobs` and `signers` tables. The `gameversions` and
//! `rhpatches` tables live in a second file attached as schema `rhdata`, or
//! in the same file when no separate path is configured.
//!
//! Opening a store migrates it in place: the signature tables are created,
//! and every existing record table gains `siglistuuid` and `row_version`
//! columns if it lacks them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use mdsign_core::{
    Database, Envelope, EnvelopeId, FieldValue, KindSpec, Record, RecordId, RecordKind,
    REFERENCE_FIELD, SignatureEntry, SignerId, Timestamp, VERSION_FIELD,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, TransactionBehavior, params, params_from_iter,
};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::{EnvelopeStore, RecordStore, StaleDelete, same_entries};

/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const RHDATA_SCHEMA: &str = "rhdata";

const SIGNATURE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS signaturelists (
        siglistuuid VARCHAR(255) PRIMARY KEY,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        signlist_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        record_type VARCHAR(255),
        record_uuid VARCHAR(255),
        signed_row_version INTEGER DEFAULT 1,
        signed_action VARCHAR(255) DEFAULT 'upsert'
    );
    CREATE TABLE IF NOT EXISTS signaturelistentries (
        sentryuuid VARCHAR(255) PRIMARY KEY,
        siglistuuid VARCHAR(255),
        signeruuid VARCHAR(255),
        signature VARCHAR(2048),
        signature_algorithm VARCHAR(50)
    );
    CREATE TABLE IF NOT EXISTS signers (
        signeruuid VARCHAR(255) PRIMARY KEY,
        signer_type VARCHAR(50),
        signer_name VARCHAR(255),
        publickey VARCHAR(2048),
        publickey_type VARCHAR(50),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        siglistuuid VARCHAR(255),
        row_version INTEGER DEFAULT 1
    );
";

const ENVELOPE_COLUMNS: &str =
    "siglistuuid, created_at, record_type, record_uuid, signed_row_version, signed_action";

const ENTRY_COLUMNS: &str = "sentryuuid, siglistuuid, signeruuid, signature, \
                             signature_algorithm, hash_algorithm, signed_at";

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                Self::AlreadyExists(err.to_string())
            },
            _ => Self::Internal(err.to_string()),
        }
    }
}

/// Where the databases live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// The `patchbin` database (signature tables, attachments, signers).
    pub patchbin: PathBuf,
    /// The `rhdata` database; `None` keeps those tables in `patchbin`.
    pub rhdata: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    /// Single-file layout at `patchbin`.
    #[must_use]
    pub fn new(patchbin: impl Into<PathBuf>) -> Self {
        Self {
            patchbin: patchbin.into(),
            rhdata: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Keep the `rhdata` tables in a separate file.
    #[must_use]
    pub fn with_rhdata(mut self, rhdata: impl Into<PathBuf>) -> Self {
        self.rhdata = Some(rhdata.into());
        self
    }

    /// Set the busy timeout.
    #[must_use]
    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// SQLite-backed record and envelope store.
///
/// One connection behind a mutex; every trait call holds it for the whole
/// statement (or transaction).
pub struct SqliteStore {
    conn: Mutex<Connection>,
    rhdata_schema: &'static str,
}

impl SqliteStore {
    /// Open (and migrate) the databases described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if a file cannot be opened or
    /// attached, and [`StorageError::Internal`] if migration fails.
    pub fn open(config: &SqliteConfig) -> StorageResult<Self> {
        ensure_parent_dir(&config.patchbin)?;
        let conn = Connection::open(&config.patchbin).map_err(|e| {
            StorageError::Connection(format!("{}: {e}", config.patchbin.display()))
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, path = %config.patchbin.display(), "Opened patchbin");

        let rhdata_schema = match &config.rhdata {
            Some(path) if path != &config.patchbin => {
                ensure_parent_dir(path)?;
                conn.execute(
                    "ATTACH DATABASE ?1 AS rhdata",
                    params![path.to_string_lossy().into_owned()],
                )
                .map_err(|e| StorageError::Connection(format!("{}: {e}", path.display())))?;
                debug!(path = %path.display(), "Attached rhdata");
                RHDATA_SCHEMA
            },
            _ => "main",
        };

        let store = Self {
            conn: Mutex::new(conn),
            rhdata_schema,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open a private in-memory database (single-file layout).
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Connection(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
            rhdata_schema: "main",
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create the signature tables and add the reference and version
    /// columns to every record table that exists. Safe to re-run.
    fn migrate(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SIGNATURE_SCHEMA)?;

        let mut added = 0_u32;
        for (column, def) in [
            ("signed_row_version", "INTEGER DEFAULT 1"),
            ("signed_action", "VARCHAR(255) DEFAULT 'upsert'"),
            ("signlist_timestamp", "TIMESTAMP"),
        ] {
            added = added.saturating_add(u32::from(add_column_if_missing(
                &conn,
                "main",
                "signaturelists",
                column,
                def,
            )?));
        }
        for (column, def) in [
            ("hash_algorithm", "VARCHAR(50) DEFAULT 'SHA256'"),
            ("signed_at", "TIMESTAMP"),
        ] {
            added = added.saturating_add(u32::from(add_column_if_missing(
                &conn,
                "main",
                "signaturelistentries",
                column,
                def,
            )?));
        }
        // Older databases may hold several entries per signer and list; keep
        // the most recently inserted one so the unique index can be built.
        let duplicates = conn.execute(
            "DELETE FROM signaturelistentries WHERE rowid NOT IN (
                 SELECT MAX(rowid) FROM signaturelistentries
                 GROUP BY siglistuuid, signeruuid
             )",
            [],
        )?;
        if duplicates > 0 {
            warn!(duplicates, "Dropped duplicate signature entries");
        }
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_signaturelistentries_list_signer
                 ON signaturelistentries (siglistuuid, signeruuid);
             CREATE INDEX IF NOT EXISTS idx_signaturelists_record
                 ON signaturelists (record_type, record_uuid);",
        )?;

        for kind in RecordKind::ALL {
            let spec = kind.spec();
            let schema = self.schema_for(spec);
            if !table_exists(&conn, schema, spec.table)? {
                continue;
            }
            for (column, def) in [
                (REFERENCE_FIELD, "VARCHAR(255)"),
                (VERSION_FIELD, "INTEGER DEFAULT 1"),
            ] {
                added = added.saturating_add(u32::from(add_column_if_missing(
                    &conn, schema, spec.table, column, def,
                )?));
            }
        }

        if added > 0 {
            info!(columns = added, "Migrated signature columns");
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Internal("sqlite connection mutex poisoned".to_owned()))
    }

    fn schema_for(&self, spec: &KindSpec) -> &'static str {
        match spec.database {
            Database::Patchbin => "main",
            Database::Rhdata => self.rhdata_schema,
        }
    }

    fn qualified(&self, spec: &KindSpec) -> String {
        format!("{}.{}", self.schema_for(spec), quote_ident(spec.table))
    }

    /// Create the record table if it does not exist and add any column
    /// `names` lacks.
    fn ensure_record_columns<'a>(
        &self,
        conn: &Connection,
        spec: &KindSpec,
        names: impl Iterator<Item = &'a str>,
    ) -> StorageResult<()> {
        let schema = self.schema_for(spec);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} VARCHAR(255) PRIMARY KEY, \
             {REFERENCE_FIELD} VARCHAR(255), {VERSION_FIELD} INTEGER DEFAULT 1);",
            self.qualified(spec),
            quote_ident(spec.primary_key),
        ))?;
        let existing = table_columns(conn, schema, spec.table)?;
        for name in names {
            if !existing.iter().any(|c| c == name) {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    self.qualified(spec),
                    quote_ident(name)
                ))?;
            }
        }
        Ok(())
    }

    fn record_exists(
        &self,
        conn: &Connection,
        kind: RecordKind,
        id: &RecordId,
    ) -> StorageResult<bool> {
        let spec = kind.spec();
        let found: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ?1",
                    self.qualified(spec),
                    quote_ident(spec.primary_key)
                ),
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("rhdata_schema", &self.rhdata_schema)
            .finish_non_exhaustive()
    }
}

impl RecordStore for SqliteStore {
    fn get_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        let spec = kind.spec();
        let conn = self.lock()?;
        if !table_exists(&conn, self.schema_for(spec), spec.table)? {
            return Ok(None);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ?1",
            self.qualified(spec),
            quote_ident(spec.primary_key)
        ))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let fields = stmt
            .query_row(params![id.as_str()], |row| {
                let mut fields = BTreeMap::new();
                for (i, name) in names.iter().enumerate() {
                    fields.insert(name.clone(), from_sql(row.get_ref(i)?));
                }
                Ok(fields)
            })
            .optional()?;

        fields
            .map(|fields| Record::from_fields(kind, fields).map_err(StorageError::from))
            .transpose()
    }

    fn list_record_ids(&self, kind: RecordKind) -> StorageResult<Vec<RecordId>> {
        let spec = kind.spec();
        let conn = self.lock()?;
        if !table_exists(&conn, self.schema_for(spec), spec.table)? {
            return Ok(Vec::new());
        }

        let pk = quote_ident(spec.primary_key);
        let mut stmt = conn.prepare(&format!(
            "SELECT {pk} FROM {} WHERE {pk} IS NOT NULL ORDER BY {pk}",
            self.qualified(spec)
        ))?;
        let ids = stmt
            .query_map([], |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Integer(n) => n.to_string(),
                    other => from_sql(other).to_string(),
                })
            })?
            .map(|id| id.map(RecordId::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn insert_record(&self, record: &Record) -> StorageResult<()> {
        let spec = record.kind().spec();
        record.id()?;
        let content: Vec<(&String, &FieldValue)> = record
            .fields()
            .iter()
            .filter(|(name, _)| *name != VERSION_FIELD && *name != REFERENCE_FIELD)
            .collect();

        let conn = self.lock()?;
        self.ensure_record_columns(&conn, spec, content.iter().map(|(name, _)| name.as_str()))?;

        let mut columns: Vec<String> = Vec::with_capacity(content.len());
        let mut placeholders: Vec<String> = Vec::with_capacity(content.len());
        let mut values: Vec<Value> = Vec::with_capacity(content.len());
        for (name, value) in content {
            values.push(to_sql(value));
            columns.push(quote_ident(name));
            placeholders.push(format!("?{}", values.len()));
        }

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {VERSION_FIELD}, {REFERENCE_FIELD}) VALUES ({}, 1, NULL)",
                self.qualified(spec),
                columns.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }

    fn update_record(&self, record: &Record) -> StorageResult<u64> {
        let spec = record.kind().spec();
        let id = record.id()?;
        let content: Vec<(&String, &FieldValue)> = record
            .fields()
            .iter()
            .filter(|(name, _)| {
                *name != VERSION_FIELD && *name != REFERENCE_FIELD && *name != spec.primary_key
            })
            .collect();

        let conn = self.lock()?;
        self.ensure_record_columns(&conn, spec, content.iter().map(|(name, _)| name.as_str()))?;

        let mut sets: Vec<String> = Vec::with_capacity(content.len());
        let mut values: Vec<Value> = Vec::with_capacity(content.len());
        for (name, value) in content {
            values.push(to_sql(value));
            sets.push(format!("{} = ?{}", quote_ident(name), values.len()));
        }
        sets.push(format!("{VERSION_FIELD} = {VERSION_FIELD} + 1"));
        values.push(Value::Text(id.as_str().to_owned()));

        let version: Option<i64> = conn
            .query_row(
                &format!(
                    "UPDATE {} SET {} WHERE {} = ?{} RETURNING {VERSION_FIELD}",
                    self.qualified(spec),
                    sets.join(", "),
                    quote_ident(spec.primary_key),
                    values.len()
                ),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .optional()?;

        let version =
            version.ok_or_else(|| StorageError::NotFound(format!("{} {id}", spec.kind)))?;
        u64::try_from(version)
            .map_err(|_| StorageError::Serialization(format!("negative row version for {id}")))
    }

    fn delete_record(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let spec = kind.spec();
        let conn = self.lock()?;
        if !table_exists(&conn, self.schema_for(spec), spec.table)? {
            return Ok(false);
        }
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                self.qualified(spec),
                quote_ident(spec.primary_key)
            ),
            params![id.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn compare_and_set_reference(
        &self,
        kind: RecordKind,
        id: &RecordId,
        expected_version: u64,
        expected: Option<EnvelopeId>,
        new: Option<EnvelopeId>,
    ) -> StorageResult<bool> {
        let spec = kind.spec();
        let version = i64::try_from(expected_version).map_err(|_| {
            StorageError::Internal(format!("row version {expected_version} out of range"))
        })?;
        let new = new.map(|e| e.to_string());

        let conn = self.lock()?;
        if !table_exists(&conn, self.schema_for(spec), spec.table)? {
            return Err(StorageError::NotFound(format!("{kind} {id}")));
        }
        let base = format!(
            "UPDATE {} SET {REFERENCE_FIELD} = ?1 WHERE {} = ?2 AND {VERSION_FIELD} = ?3",
            self.qualified(spec),
            quote_ident(spec.primary_key)
        );
        let updated = match expected {
            Some(current) => conn.execute(
                &format!("{base} AND {REFERENCE_FIELD} = ?4"),
                params![new, id.as_str(), version, current.to_string()],
            )?,
            None => conn.execute(
                &format!("{base} AND ({REFERENCE_FIELD} IS NULL OR {REFERENCE_FIELD} = '')"),
                params![new, id.as_str(), version],
            )?,
        };

        if updated > 0 {
            return Ok(true);
        }
        if self.record_exists(&conn, kind, id)? {
            Ok(false)
        } else {
            Err(StorageError::NotFound(format!("{kind} {id}")))
        }
    }
}

impl EnvelopeStore for SqliteStore {
    fn create_envelope(&self, envelope: &Envelope) -> StorageResult<()> {
        let version = i64::try_from(envelope.signed_row_version).map_err(|_| {
            StorageError::Internal(format!(
                "row version {} out of range",
                envelope.signed_row_version
            ))
        })?;
        let created = envelope.created_at.to_rfc3339();
        self.lock()?.execute(
            "INSERT INTO signaturelists (siglistuuid, created_at, signlist_timestamp, \
             record_type, record_uuid, signed_row_version, signed_action) \
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6)",
            params![
                envelope.id.to_string(),
                created,
                envelope.record_kind,
                envelope.record_id.as_str(),
                version,
                envelope.action.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_envelope(&self, id: EnvelopeId) -> StorageResult<Option<Envelope>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {ENVELOPE_COLUMNS} FROM signaturelists WHERE siglistuuid = ?1"),
                params![id.to_string()],
                EnvelopeRow::from_row,
            )
            .optional()?;
        row.map(EnvelopeRow::into_envelope).transpose()
    }

    fn list_envelopes(&self) -> StorageResult<Vec<Envelope>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENVELOPE_COLUMNS} FROM signaturelists ORDER BY created_at, siglistuuid"
        ))?;
        let rows = stmt
            .query_map([], EnvelopeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EnvelopeRow::into_envelope).collect()
    }

    fn delete_envelope(&self, id: EnvelopeId) -> StorageResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = id.to_string();
        let entries = tx.execute(
            "DELETE FROM signaturelistentries WHERE siglistuuid = ?1",
            params![id],
        )?;
        let lists = tx.execute("DELETE FROM signaturelists WHERE siglistuuid = ?1", params![id])?;
        tx.commit()?;
        debug!(envelope_id = %id, entries, "Deleted envelope");
        Ok(lists > 0)
    }

    fn delete_stale_envelope(
        &self,
        envelope: &Envelope,
        expected: &[SignatureEntry],
    ) -> StorageResult<StaleDelete> {
        let signed = i64::try_from(envelope.signed_row_version).unwrap_or(i64::MAX);
        let id = envelope.id.to_string();
        let mut conn = self.lock()?;
        // Take the write lock up front so no other process can adopt the
        // envelope between the checks and the delete.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM signaturelists WHERE siglistuuid = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(StaleDelete::Missing);
        }

        if let Ok(kind) = envelope.kind() {
            let spec = kind.spec();
            if table_exists(&tx, self.schema_for(spec), spec.table)? {
                let adopted: Option<i64> = tx
                    .query_row(
                        &format!(
                            "SELECT 1 FROM {} WHERE {} = ?1 AND {REFERENCE_FIELD} = ?2 \
                             AND COALESCE({VERSION_FIELD}, 1) <= ?3",
                            self.qualified(spec),
                            quote_ident(spec.primary_key)
                        ),
                        params![envelope.record_id.as_str(), id, signed],
                        |row| row.get(0),
                    )
                    .optional()?;
                if adopted.is_some() {
                    return Ok(StaleDelete::Current);
                }
            }
        }

        if !same_entries(&select_entries(&tx, envelope.id)?, expected) {
            return Ok(StaleDelete::Changed);
        }

        let entries = tx.execute(
            "DELETE FROM signaturelistentries WHERE siglistuuid = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM signaturelists WHERE siglistuuid = ?1", params![id])?;
        tx.commit()?;
        debug!(envelope_id = %id, entries, "Deleted stale envelope");
        Ok(StaleDelete::Deleted)
    }

    fn get_entry(
        &self,
        envelope_id: EnvelopeId,
        signer_id: SignerId,
    ) -> StorageResult<Option<SignatureEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM signaturelistentries \
                     WHERE siglistuuid = ?1 AND signeruuid = ?2"
                ),
                params![envelope_id.to_string(), signer_id.to_string()],
                EntryRow::from_row,
            )
            .optional()?;
        row.map(EntryRow::into_entry).transpose()
    }

    fn insert_entry(&self, entry: &SignatureEntry) -> StorageResult<()> {
        let conn = self.lock()?;
        let envelope_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM signaturelists WHERE siglistuuid = ?1",
                params![entry.envelope_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if envelope_exists.is_none() {
            return Err(StorageError::NotFound(format!("envelope {}", entry.envelope_id)));
        }
        conn.execute(
            &format!(
                "INSERT INTO signaturelistentries ({ENTRY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                entry.id.to_string(),
                entry.envelope_id.to_string(),
                entry.signer_id.to_string(),
                entry.signature_hex(),
                entry.algorithm.as_str(),
                entry.hash_algorithm.as_str(),
                entry.signed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_entry(&self, entry: &SignatureEntry) -> StorageResult<bool> {
        let updated = self.lock()?.execute(
            "UPDATE signaturelistentries \
             SET signature = ?1, signature_algorithm = ?2, hash_algorithm = ?3, signed_at = ?4 \
             WHERE siglistuuid = ?5 AND signeruuid = ?6",
            params![
                entry.signature_hex(),
                entry.algorithm.as_str(),
                entry.hash_algorithm.as_str(),
                entry.signed_at.to_rfc3339(),
                entry.envelope_id.to_string(),
                entry.signer_id.to_string(),
            ],
        )?;
        Ok(updated > 0)
    }

    fn list_entries(&self, envelope_id: EnvelopeId) -> StorageResult<Vec<SignatureEntry>> {
        select_entries(&*self.lock()?, envelope_id)
    }
}

fn select_entries(conn: &Connection, envelope_id: EnvelopeId) -> StorageResult<Vec<SignatureEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM signaturelistentries \
         WHERE siglistuuid = ?1 ORDER BY signed_at, sentryuuid"
    ))?;
    let rows = stmt
        .query_map(params![envelope_id.to_string()], EntryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(EntryRow::into_entry).collect()
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

struct EnvelopeRow {
    id: String,
    created_at: Option<String>,
    record_type: Option<String>,
    record_uuid: Option<String>,
    signed_row_version: Option<i64>,
    signed_action: Option<String>,
}

impl EnvelopeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            record_type: row.get(2)?,
            record_uuid: row.get(3)?,
            signed_row_version: row.get(4)?,
            signed_action: row.get(5)?,
        })
    }

    fn into_envelope(self) -> StorageResult<Envelope> {
        let signed_row_version =
            u64::try_from(self.signed_row_version.unwrap_or(1)).map_err(|_| {
                StorageError::Serialization(format!("envelope {}: negative version", self.id))
            })?;
        Ok(Envelope {
            id: self.id.parse()?,
            record_kind: self.record_type.unwrap_or_default(),
            record_id: RecordId::new(self.record_uuid.unwrap_or_default()),
            signed_row_version,
            action: self.signed_action.as_deref().unwrap_or("upsert").parse()?,
            created_at: parse_timestamp(self.created_at.as_deref())?,
        })
    }
}

struct EntryRow {
    id: String,
    envelope_id: String,
    signer_id: String,
    signature: String,
    algorithm: String,
    hash_algorithm: Option<String>,
    signed_at: Option<String>,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            envelope_id: row.get(1)?,
            signer_id: row.get(2)?,
            signature: row.get(3)?,
            algorithm: row.get(4)?,
            hash_algorithm: row.get(5)?,
            signed_at: row.get(6)?,
        })
    }

    fn into_entry(self) -> StorageResult<SignatureEntry> {
        let signature = hex::decode(&self.signature).map_err(|e| {
            StorageError::Serialization(format!("entry {}: signature: {e}", self.id))
        })?;
        Ok(SignatureEntry {
            id: self.id.parse()?,
            envelope_id: self.envelope_id.parse()?,
            signer_id: self.signer_id.parse()?,
            signature,
            algorithm: self.algorithm.parse()?,
            hash_algorithm: self.hash_algorithm.as_deref().unwrap_or("SHA256").parse()?,
            signed_at: parse_timestamp(self.signed_at.as_deref())?,
        })
    }
}

fn parse_timestamp(value: Option<&str>) -> StorageResult<Timestamp> {
    match value {
        Some(s) if !s.is_empty() => Ok(Timestamp::parse(s)?),
        _ => Ok(Timestamp::epoch()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Real(r) => Value::Real(*r),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Timestamp(ts) => Value::Text(ts.to_rfc3339()),
        FieldValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(n) => FieldValue::Integer(n),
        ValueRef::Real(r) => FieldValue::Real(r),
        ValueRef::Text(bytes) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => FieldValue::Blob(bytes.to_vec()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, schema: &str, table: &str) -> StorageResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {schema}.sqlite_master WHERE type = 'table' AND name = ?1"),
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn table_columns(conn: &Connection, schema: &str, table: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA {schema}.table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn add_column_if_missing(
    conn: &Connection,
    schema: &str,
    table: &str,
    column: &str,
    definition: &str,
) -> StorageResult<bool> {
    if table_columns(conn, schema, table)?.iter().any(|c| c == column) {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {schema}.{} ADD COLUMN {column} {definition};",
        quote_ident(table)
    ))?;
    debug!(schema, table, column, "Added column");
    Ok(true)
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::Connection(format!("{}: {e}", parent.display())))?;
    }
    Ok(())
}
