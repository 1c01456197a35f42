//! Configuration types.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working
//! configuration.

use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file locations.
    pub database: DatabaseSection,
    /// Audit log location.
    pub audit: AuditSection,
    /// Key used to wrap API responses.
    pub server_signer: ServerSignerSection,
    /// Signing behaviour.
    pub signing: SigningSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// DatabaseSection
// ---------------------------------------------------------------------------

/// SQLite database locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// The `patchbin` database. Signature tables always live here.
    pub patchbin: PathBuf,
    /// The `rhdata` database. Defaults to the `patchbin` file when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhdata: Option<PathBuf>,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            patchbin: PathBuf::from("patchbin.db"),
            rhdata: None,
            busy_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit log location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// JSON Lines file that new and archived signatures are appended to.
    pub log_path: PathBuf,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("mdsign-audit.jsonl"),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerSignerSection
// ---------------------------------------------------------------------------

/// The service signer used for response signatures.
///
/// Either `keyfile` or the `signer_id` + `algorithm` + `private_key_hex`
/// triple may be given. With neither, responses go out unsigned.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSignerSection {
    /// Signer UUID.
    pub signer_id: Option<String>,
    /// `ED25519` or `RSA`.
    pub algorithm: Option<String>,
    /// Keyfile holding the whole identity.
    pub keyfile: Option<PathBuf>,
    /// PKCS#8 DER private key, hex. Prefer the environment over a file.
    pub private_key_hex: Option<String>,
}

impl ServerSignerSection {
    /// Whether any field is set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.signer_id.is_some()
            || self.algorithm.is_some()
            || self.keyfile.is_some()
            || self.private_key_hex.is_some()
    }
}

impl std::fmt::Debug for ServerSignerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSignerSection")
            .field("signer_id", &self.signer_id)
            .field("algorithm", &self.algorithm)
            .field("keyfile", &self.keyfile)
            .field("has_private_key_hex", &self.private_key_hex.is_some())
            .finish()
    }
}

impl Serialize for ServerSignerSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ServerSignerSection", 3)?;
        if let Some(id) = &self.signer_id {
            state.serialize_field("signer_id", id)?;
        }
        if let Some(algorithm) = &self.algorithm {
            state.serialize_field("algorithm", algorithm)?;
        }
        if let Some(keyfile) = &self.keyfile {
            state.serialize_field("keyfile", keyfile)?;
        }
        // private_key_hex is never written out.
        state.end()
    }
}

// ---------------------------------------------------------------------------
// SigningSection
// ---------------------------------------------------------------------------

/// Signing behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// Attempts per record when its row version keeps moving.
    pub max_attempts: u32,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Write logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Per-crate tracing directives (e.g. `["mdsign_storage=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            file: None,
            directives: Vec::new(),
        }
    }
}
