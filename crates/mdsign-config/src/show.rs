//! Source-annotated display for `config show`.

use std::fmt::{self, Write as _};
use std::path::Path;

use crate::loader::SYSTEM_CONFIG_PATH;
use crate::merge::FieldSources;
use crate::types::Config;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with inline comments showing source.
    Toml,
    /// JSON (for programmatic consumption).
    Json,
}

impl ResolvedConfig {
    /// Format the resolved config, optionally restricted to one section.
    ///
    /// The service signer's private key never appears in the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or `section` does not exist.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(section),
            ShowFormat::Json => self.show_json(section),
        }
    }

    fn section_value(&self, name: &str) -> Result<toml::Value, fmt::Error> {
        let val = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        val.as_table()
            .and_then(|table| table.get(name))
            .cloned()
            .ok_or(fmt::Error)
    }

    fn show_toml(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let toml_str = match section {
            Some(name) => toml::to_string_pretty(&self.section_value(name)?),
            None => toml::to_string_pretty(&self.config),
        }
        .map_err(|_| fmt::Error)?;

        let mut output = String::new();
        output.push_str("# Resolved mdsign configuration\n");
        output.push_str("# Source annotations: [defaults] [system] [user] [--config] [env]\n");

        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        // Section headers move the prefix when showing the whole tree.
        let mut prefix = section.unwrap_or("").to_owned();
        for line in toml_str.lines() {
            let trimmed = line.trim();
            if section.is_none()
                && let Some(header) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']'))
            {
                header.clone_into(&mut prefix);
            }

            match self.annotate_line(trimmed, &prefix) {
                Some(annotation) => writeln!(output, "{line}  # {annotation}")?,
                None => writeln!(output, "{line}")?,
            }
        }

        Ok(output)
    }

    fn show_json(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        match section {
            Some(name) => serde_json::to_string_pretty(&self.section_value(name)?),
            None => serde_json::to_string_pretty(&self.config),
        }
        .map_err(|_| fmt::Error)
    }

    /// Source annotation for a `key = value` line.
    fn annotate_line(&self, trimmed: &str, prefix: &str) -> Option<String> {
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }

        let key = trimmed.split('=').next()?.trim();
        let field_path = if prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{prefix}.{key}")
        };

        self.field_sources
            .get(&field_path)
            .map(|layer| format!("[{layer}]"))
    }

    /// List all config file paths that are checked during loading.
    #[must_use]
    pub fn config_paths(home_dir: Option<&Path>, explicit: Option<&Path>) -> Vec<String> {
        let mut paths = vec![SYSTEM_CONFIG_PATH.to_owned()];

        match home_dir {
            Some(home) => paths.push(home.join(".mdsign").join("config.toml").display().to_string()),
            None => paths.push("~/.mdsign/config.toml".to_owned()),
        }

        if let Some(path) = explicit {
            paths.push(path.display().to_string());
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    fn resolved(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            config,
            field_sources: FieldSources::new(),
            loaded_files: Vec::new(),
        }
    }

    #[test]
    fn test_show_toml_default() {
        let output = resolved(Config::default()).show(ShowFormat::Toml, None).unwrap();
        assert!(output.contains("Resolved mdsign configuration"));
        assert!(output.contains("patchbin.db"));
        assert!(output.contains("max_attempts = 3"));
    }

    #[test]
    fn test_show_json_default() {
        let output = resolved(Config::default()).show(ShowFormat::Json, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["signing"]["max_attempts"], 3);
    }

    #[test]
    fn test_show_section() {
        let output = resolved(Config::default())
            .show(ShowFormat::Toml, Some("logging"))
            .unwrap();
        assert!(output.contains("compact"));
        assert!(!output.contains("patchbin.db"));
    }

    #[test]
    fn test_show_unknown_section_fails() {
        assert!(resolved(Config::default()).show(ShowFormat::Json, Some("nope")).is_err());
    }

    #[test]
    fn test_show_never_prints_private_key() {
        let mut config = Config::default();
        config.server_signer.signer_id = Some("svc".to_owned());
        config.server_signer.algorithm = Some("ED25519".to_owned());
        config.server_signer.private_key_hex = Some("deadbeefcafe".to_owned());
        let resolved = resolved(config);

        let toml_out = resolved.show(ShowFormat::Toml, None).unwrap();
        let json_out = resolved.show(ShowFormat::Json, None).unwrap();
        assert!(toml_out.contains("svc"));
        assert!(!toml_out.contains("deadbeefcafe"));
        assert!(!json_out.contains("deadbeefcafe"));
    }

    #[test]
    fn test_annotations_follow_sections() {
        let mut r = resolved(Config::default());
        r.field_sources
            .insert("signing.max_attempts".to_owned(), ConfigLayer::User);
        r.loaded_files.push("/home/u/.mdsign/config.toml".to_owned());

        let output = r.show(ShowFormat::Toml, None).unwrap();
        assert!(output.contains("max_attempts = 3  # [user (~/.mdsign/config.toml)]"));
        assert!(output.contains("1. /home/u/.mdsign/config.toml"));
    }

    #[test]
    fn test_config_paths() {
        let paths = ResolvedConfig::config_paths(
            Some(Path::new("/home/user")),
            Some(Path::new("/srv/mdsign.toml")),
        );
        assert_eq!(paths.len(), 3);
        assert!(paths[0].contains("/etc/mdsign"));
        assert!(paths[1].contains("/home/user/.mdsign"));
        assert_eq!(paths[2], "/srv/mdsign.toml");
    }
}
