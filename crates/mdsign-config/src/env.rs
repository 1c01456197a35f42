//! Environment variable fallbacks.
//!
//! Environment variables are a **fallback**, not an override: they only fill
//! fields that no config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `MDSIGN_*` and legacy env var mappings. Earlier entries win
/// when two variables target the same field.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "MDSIGN_PATCHBIN_DB",
        field_path: "database.patchbin",
    },
    EnvMapping {
        var_name: "MDSIGN_RHDATA_DB",
        field_path: "database.rhdata",
    },
    EnvMapping {
        var_name: "MDSIGN_AUDIT_LOG",
        field_path: "audit.log_path",
    },
    EnvMapping {
        var_name: "MDSIGN_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "MDSIGN_MAX_ATTEMPTS",
        field_path: "signing.max_attempts",
    },
    // Service signer, same names the API server has always read.
    EnvMapping {
        var_name: "SERVER_SIGNER_UUID",
        field_path: "server_signer.signer_id",
    },
    EnvMapping {
        var_name: "SERVER_SIGNER_ALGORITHM",
        field_path: "server_signer.algorithm",
    },
    EnvMapping {
        var_name: "SERVER_PRIVATE_KEY_HEX",
        field_path: "server_signer.private_key_hex",
    },
    EnvMapping {
        var_name: "SERVER_SIGNER_KEYFILE",
        field_path: "server_signer.keyfile",
    },
    // Legacy database paths.
    EnvMapping {
        var_name: "PATCHBIN_DB_PATH",
        field_path: "database.patchbin",
    },
    EnvMapping {
        var_name: "RHDATA_DB_PATH",
        field_path: "database.rhdata",
    },
];

/// Supported environment variables and the field each one fills.
pub fn env_fallbacks() -> impl Iterator<Item = (&'static str, &'static str)> {
    ENV_MAPPINGS.iter().map(|m| (m.var_name, m.field_path))
}

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Set a field in the TOML tree from a string value, creating intermediate
/// tables as needed.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);

    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), toml_val);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Coerce a string env var value to the TOML type of its field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(path, "signing.max_attempts" | "database.busy_timeout_ms")
        && let Ok(i) = val.parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_env_fallbacks_list_new_names_before_legacy() {
        let names: Vec<_> = env_fallbacks().map(|(var, _)| var).collect();
        let new = names.iter().position(|v| *v == "MDSIGN_PATCHBIN_DB").unwrap();
        let legacy = names.iter().position(|v| *v == "PATCHBIN_DB_PATH").unwrap();
        assert!(new < legacy);
    }

    #[test]
    fn test_apply_env_fallbacks() {
        let mut merged: toml::Value = toml::from_str("[database]\npatchbin = \"p.db\"").unwrap();
        let mut sources = FieldSources::new();
        let env = make_env(&[("MDSIGN_LOG_LEVEL", "debug"), ("MDSIGN_MAX_ATTEMPTS", "7")]);

        let count = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(count, 2);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["signing"]["max_attempts"].as_integer(), Some(7));
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_env_fallback_skips_file_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("MDSIGN_LOG_LEVEL", "debug")]);
        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_env_fallback_beats_defaults() {
        let mut merged: toml::Value = toml::from_str("[database]\npatchbin = \"default.db\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("database.patchbin".to_owned(), ConfigLayer::Defaults);

        let env = make_env(&[("PATCHBIN_DB_PATH", "/srv/patchbin.db")]);
        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["database"]["patchbin"].as_str(), Some("/srv/patchbin.db"));
    }

    #[test]
    fn test_new_name_wins_over_legacy() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[
            ("MDSIGN_RHDATA_DB", "new.db"),
            ("RHDATA_DB_PATH", "old.db"),
        ]);

        apply_env_fallbacks(&mut merged, &mut sources, &env);
        assert_eq!(merged["database"]["rhdata"].as_str(), Some("new.db"));
    }

    #[test]
    fn test_server_signer_from_env() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[
            ("SERVER_SIGNER_UUID", "0b0f4e5c-0000-4000-8000-000000000001"),
            ("SERVER_SIGNER_ALGORITHM", "ED25519"),
            ("SERVER_PRIVATE_KEY_HEX", "abcd"),
        ]);

        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 3);
        assert_eq!(merged["server_signer"]["algorithm"].as_str(), Some("ED25519"));
        assert_eq!(merged["server_signer"]["private_key_hex"].as_str(), Some("abcd"));
    }
}
