//! Bridge from `mdsign_config::Config` to runtime components.
//!
//! The config crate has no dependencies on other mdsign crates. This module
//! turns its plain values into the store, audit log, service signer, and
//! runtime the CLI (or an embedding API server) works with.

use std::sync::Arc;

use mdsign_audit::AuditLog;
use mdsign_config::Config;
use mdsign_core::{Algorithm, SignerId};
use mdsign_crypto::{Keyfile, LocalSigner, PrivateKey, SigningCapability};
use mdsign_storage::{SignatureStore, SqliteConfig, SqliteStore};
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{RuntimeConfig, SignatureRuntime};

/// Convert config to [`RuntimeConfig`].
#[must_use]
pub fn to_runtime_config(cfg: &Config) -> RuntimeConfig {
    RuntimeConfig {
        max_attempts: cfg.signing.max_attempts,
    }
}

/// Convert config to [`SqliteConfig`].
#[must_use]
pub fn to_sqlite_config(cfg: &Config) -> SqliteConfig {
    let mut sqlite = SqliteConfig::new(&cfg.database.patchbin)
        .with_busy_timeout_ms(cfg.database.busy_timeout_ms);
    if let Some(rhdata) = &cfg.database.rhdata {
        sqlite = sqlite.with_rhdata(rhdata);
    }
    sqlite
}

/// Open the SQLite store described by `[database]`.
///
/// # Errors
///
/// Returns a storage error if a database cannot be opened or migrated.
pub fn open_store(cfg: &Config) -> RuntimeResult<SqliteStore> {
    let store = SqliteStore::open(&to_sqlite_config(cfg))?;
    debug!(
        patchbin = %cfg.database.patchbin.display(),
        rhdata = %cfg.rhdata_path().display(),
        "opened signature store"
    );
    Ok(store)
}

/// Open the audit log described by `[audit]`.
///
/// # Errors
///
/// Returns an audit error if the log file cannot be opened for appending.
pub fn open_audit(cfg: &Config) -> RuntimeResult<AuditLog> {
    Ok(AuditLog::open(&cfg.audit.log_path)?)
}

/// Load the service signer described by `[server_signer]`, if any.
///
/// Returns `Ok(None)` when nothing is configured; responses then go out
/// without a server signature.
///
/// # Errors
///
/// Returns [`RuntimeError::ConfigError`] for a half-configured section, and
/// core or crypto errors for a bad id, algorithm, key, or keyfile.
pub fn load_service_signer(cfg: &Config) -> RuntimeResult<Option<Arc<dyn SigningCapability>>> {
    let section = &cfg.server_signer;
    if !section.is_configured() {
        return Ok(None);
    }

    let signer = if let Some(path) = &section.keyfile {
        let keyfile = Keyfile::load(path)?;
        info!(path = %path.display(), signer_id = %keyfile.signer_id, "loaded service signer keyfile");
        keyfile.into_signer()
    } else {
        let (Some(id), Some(algorithm), Some(key_hex)) = (
            &section.signer_id,
            &section.algorithm,
            &section.private_key_hex,
        ) else {
            return Err(RuntimeError::ConfigError(
                "server_signer needs signer_id, algorithm and private_key_hex, or a keyfile"
                    .to_owned(),
            ));
        };
        let signer_id: SignerId = id.parse()?;
        let algorithm: Algorithm = algorithm.parse()?;
        let key = PrivateKey::from_hex(algorithm, key_hex)?;
        info!(signer_id = %signer_id, algorithm = %algorithm, "loaded service signer key");
        LocalSigner::new(signer_id, key)
    };

    Ok(Some(Arc::new(signer) as Arc<dyn SigningCapability>))
}

/// Open the store and audit log and build a [`SignatureRuntime`] over them.
///
/// # Errors
///
/// See [`open_store`] and [`open_audit`].
pub fn open_runtime(cfg: &Config) -> RuntimeResult<SignatureRuntime> {
    let store: Arc<dyn SignatureStore> = Arc::new(open_store(cfg)?);
    let audit = Arc::new(open_audit(cfg)?);
    Ok(SignatureRuntime::new(store, audit, to_runtime_config(cfg)))
}
