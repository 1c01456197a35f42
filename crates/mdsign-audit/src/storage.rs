//! Audit log storage trait and its JSON Lines and in-memory backends.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::debug;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

/// Storage backend for audit logs.
///
/// Implementations only ever append; nothing is overwritten or removed.
pub trait AuditStorage: Send + Sync {
    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn store(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// All entries, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or decoded.
    fn entries(&self) -> AuditResult<Vec<AuditEntry>>;

    /// Count total entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    fn count(&self) -> AuditResult<usize>;

    /// Flush pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to flush.
    fn flush(&self) -> AuditResult<()>;
}

/// Append-only JSON Lines file, one entry per line.
pub struct JsonlAuditStorage {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonlAuditStorage {
    /// Open (or create) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened audit log");
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for JsonlAuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditStorage")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl AuditStorage for JsonlAuditStorage {
    fn store(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self
            .writer
            .lock()
            .map_err(|e| AuditError::StorageError(e.to_string()))?;
        // One write per line keeps concurrent appenders from interleaving.
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|e| AuditError::CorruptLine {
                line: index.saturating_add(1),
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn count(&self) -> AuditResult<usize> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut count = 0_usize;
        for line in reader.lines() {
            if !line?.trim().is_empty() {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    fn flush(&self) -> AuditResult<()> {
        let file = self
            .writer
            .lock()
            .map_err(|e| AuditError::StorageError(e.to_string()))?;
        file.sync_all()?;
        Ok(())
    }
}

/// In-memory storage (for testing).
#[derive(Debug, Default)]
pub struct MemoryAuditStorage {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStorage for MemoryAuditStorage {
    fn store(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries
            .write()
            .map_err(|e| AuditError::StorageError(e.to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|e| AuditError::StorageError(e.to_string()))?
            .clone())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|e| AuditError::StorageError(e.to_string()))?
            .len())
    }

    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ArchiveReason;
    use mdsign_core::{Envelope, RecordId, RecordKind};

    fn archived(id: &str) -> AuditEntry {
        AuditEntry::archived(
            Envelope::new(RecordKind::Attachments, RecordId::new(id), 1),
            Vec::new(),
            ArchiveReason::RecordDeleted,
            None,
        )
    }

    #[test]
    fn test_jsonl_appends_and_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("signatures.jsonl");

        {
            let storage = JsonlAuditStorage::open(&path).unwrap();
            storage.store(&archived("a-1")).unwrap();
            storage.store(&archived("a-2")).unwrap();
            storage.flush().unwrap();
        }

        // Reopening appends rather than truncating.
        let storage = JsonlAuditStorage::open(&path).unwrap();
        storage.store(&archived("a-3")).unwrap();

        let entries = storage.entries().unwrap();
        assert_eq!(storage.count().unwrap(), 3);
        let ids: Vec<&str> = entries.iter().map(|e| e.record_id().as_str()).collect();
        assert_eq!(ids, ["a-1", "a-2", "a-3"]);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().all(|l| l.starts_with("{\"type\":\"archived\"")));
    }

    #[test]
    fn test_jsonl_reports_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let storage = JsonlAuditStorage::open(&path).unwrap();
        storage.store(&archived("a-1")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        assert!(matches!(
            storage.entries(),
            Err(AuditError::CorruptLine { line: 2, .. })
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryAuditStorage::new();
        storage.store(&archived("a-1")).unwrap();
        assert_eq!(storage.count().unwrap(), 1);
        assert_eq!(storage.entries().unwrap().len(), 1);
    }
}
