//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mdsign_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{RuntimeError, RuntimeResult};

// Runtime
pub use crate::{RuntimeConfig, SignatureRuntime};

// Components
pub use crate::{LifecycleManager, ResponseSigner, SignerRegistry, Sweeper, Verifier};

// Outcomes
pub use crate::{EnsureOutcome, RecordVerification, SignAllReport, SignOutcome, SweepReport};
