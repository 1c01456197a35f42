//! mdsign Audit - append-only history of record signatures.
//!
//! Every signature added to an envelope and every envelope removed from
//! storage leaves an entry here. Once an envelope is deleted this log is the
//! only place its signatures survive, so nothing in it is ever rewritten.
//!
//! # Format
//!
//! The file backend writes JSON Lines. Each line is a self-contained object
//! tagged by `"type"`:
//!
//! ```text
//! {"type":"new_signature","recorded_at":"...","record_kind":"gameversions","record_id":"gv-1","row_version":1,...}
//! {"type":"archived","recorded_at":"...","reason":"version_outdated","envelope":{...},"entries":[...]}
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod entry;
mod error;
mod log;
mod storage;

pub use entry::{ArchiveReason, ArchivedEnvelope, AuditEntry, NewSignature, RecordSnapshot};
pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, AuditStats};
pub use storage::{AuditStorage, JsonlAuditStorage, MemoryAuditStorage};
