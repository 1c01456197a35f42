//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mdsign_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Entries
pub use crate::{ArchiveReason, AuditEntry};

// Log
pub use crate::{AuditLog, AuditStorage};
