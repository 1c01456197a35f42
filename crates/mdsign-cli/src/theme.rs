//! CLI theme and styling.

use colored::Colorize;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Format a key-value pair.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("  {:<14} {}", format!("{key}:").bold(), value)
    }

    /// Format an identifier (shortened to eight characters).
    pub(crate) fn short_id(id: &str) -> String {
        let short: String = id.chars().take(8).collect();
        format!("{}", short.cyan())
    }

    /// Color a signing status.
    pub(crate) fn status(status: &str) -> String {
        match status {
            "signed" | "re-signed" => status.green().to_string(),
            _ => status.yellow().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates() {
        colored::control::set_override(false);
        assert_eq!(Theme::short_id("0123456789abcdef"), "01234567");
        assert_eq!(Theme::short_id("abc"), "abc");
    }

    #[test]
    fn test_kv_contains_both_parts() {
        colored::control::set_override(false);
        let line = Theme::kv("Signer", "metadata-bot");
        assert!(line.contains("Signer:"));
        assert!(line.contains("metadata-bot"));
    }
}
