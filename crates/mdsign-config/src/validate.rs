//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_database(config)?;
    validate_signing(config)?;
    validate_server_signer(config)?;
    validate_logging(config)?;
    Ok(())
}

/// Upper bound on `busy_timeout_ms` (10 minutes).
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

/// Upper bound on `max_attempts`.
const MAX_ATTEMPTS_UPPER_BOUND: u32 = 100;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_database(config: &Config) -> ConfigResult<()> {
    let db = &config.database;

    if db.patchbin.as_os_str().is_empty() {
        return Err(invalid("database.patchbin", "path must not be empty"));
    }
    if db.rhdata.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
        return Err(invalid("database.rhdata", "path must not be empty when set"));
    }
    if db.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(invalid(
            "database.busy_timeout_ms",
            format!("must not exceed {MAX_BUSY_TIMEOUT_MS}"),
        ));
    }
    Ok(())
}

fn validate_signing(config: &Config) -> ConfigResult<()> {
    let attempts = config.signing.max_attempts;
    if attempts == 0 || attempts > MAX_ATTEMPTS_UPPER_BOUND {
        return Err(invalid(
            "signing.max_attempts",
            format!("must be between 1 and {MAX_ATTEMPTS_UPPER_BOUND}"),
        ));
    }
    Ok(())
}

fn validate_server_signer(config: &Config) -> ConfigResult<()> {
    let s = &config.server_signer;
    if !s.is_configured() {
        return Ok(());
    }

    if let Some(algorithm) = &s.algorithm
        && !matches!(
            algorithm.trim().to_ascii_uppercase().as_str(),
            "ED25519" | "RSA" | "RSA-PSS" | "RSA-PSS-SHA256"
        )
    {
        return Err(invalid(
            "server_signer.algorithm",
            format!("unsupported algorithm '{algorithm}'; expected ED25519 or RSA"),
        ));
    }

    if s.keyfile.is_some() {
        if s.private_key_hex.is_some() {
            return Err(invalid(
                "server_signer",
                "set either keyfile or private_key_hex, not both",
            ));
        }
        return Ok(());
    }

    let missing: Vec<&str> = [
        ("signer_id", s.signer_id.is_none()),
        ("algorithm", s.algorithm.is_none()),
        ("private_key_hex", s.private_key_hex.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(invalid(
            "server_signer",
            format!(
                "partially configured; missing {} (or set keyfile)",
                missing.join(", ")
            ),
        ))
    }
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "invalid level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "invalid format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    if l.directives.iter().any(|d| d.trim().is_empty()) {
        return Err(invalid("logging.directives", "directives must not be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.signing.max_attempts = 0;
        assert_eq!(field_of(validate(&config)), "signing.max_attempts");
    }

    #[test]
    fn test_empty_patchbin_rejected() {
        let mut config = Config::default();
        config.database.patchbin = PathBuf::new();
        assert_eq!(field_of(validate(&config)), "database.patchbin");
    }

    #[test]
    fn test_bad_logging_rejected() {
        let mut config = Config::default();
        config.logging.level = "loud".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn test_half_configured_server_signer_rejected() {
        let mut config = Config::default();
        config.server_signer.signer_id = Some("svc".to_owned());
        config.server_signer.algorithm = Some("ED25519".to_owned());

        match validate(&config) {
            Err(ConfigError::ValidationError { field, message }) => {
                assert_eq!(field, "server_signer");
                assert!(message.contains("private_key_hex"));
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_complete_server_signer_accepted() {
        let mut config = Config::default();
        config.server_signer.signer_id = Some("svc".to_owned());
        config.server_signer.algorithm = Some("rsa".to_owned());
        config.server_signer.private_key_hex = Some("00".to_owned());
        assert!(validate(&config).is_ok());

        let mut config = Config::default();
        config.server_signer.keyfile = Some(PathBuf::from("/etc/mdsign/server.key"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_keyfile_and_hex_conflict() {
        let mut config = Config::default();
        config.server_signer.keyfile = Some(PathBuf::from("server.key"));
        config.server_signer.private_key_hex = Some("00".to_owned());
        assert_eq!(field_of(validate(&config)), "server_signer");
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = Config::default();
        config.server_signer.algorithm = Some("DSA".to_owned());
        assert_eq!(field_of(validate(&config)), "server_signer.algorithm");
    }
}
