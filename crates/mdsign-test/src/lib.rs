//! mdsign Test - shared fixtures for the mdsign crates.
//!
//! Use as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! mdsign-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use mdsign_test::{ed25519_signer, sample_record, seeded_store};
//! use mdsign_core::RecordKind;
//!
//! let store = seeded_store(&[sample_record(RecordKind::Rhpatches, "rhp-1")]);
//! let key = ed25519_signer();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
