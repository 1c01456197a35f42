//! mdsign Storage - records, envelopes and signature entries.
//!
//! Two traits describe what signing needs from persistence:
//!
//! - [`RecordStore`]: the signable records, their `row_version` and their
//!   reference to the current envelope, with a single-row compare-and-set on
//!   that reference
//! - [`EnvelopeStore`]: envelopes and their per-signer entries
//!
//! [`SignatureStore`] is the union of both. Backends:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryStore`] | Tests and ephemeral data |
//! | [`SqliteStore`] | The `patchbin` / `rhdata` SQLite databases |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::{DEFAULT_BUSY_TIMEOUT_MS, SqliteConfig, SqliteStore};
pub use store::{EnvelopeStore, RecordStore, SignatureStore, StaleDelete, same_entries};
