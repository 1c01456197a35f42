//! mdsign Telemetry - logging and request tracing.
//!
//! This crate provides:
//! - Subscriber setup with pretty, compact, JSON, and full formats
//! - Stdout, stderr, or file output
//! - A request context that scopes one command's logs under a span
//!
//! With the `config` feature, a [`LogConfig`] can be built from the
//! `[logging]` section of `mdsign-config`.
//!
//! # Example
//!
//! ```rust,no_run
//! use mdsign_telemetry::{LogConfig, LogFormat, RequestGuard, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), mdsign_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Json)
//!     .with_directive("mdsign_storage=trace");
//! setup_logging(&config)?;
//!
//! let _guard = RequestGuard::new(RequestContext::new("sign").with_record("rhpatches", "rhp-1"));
//! tracing::info!("signing");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
