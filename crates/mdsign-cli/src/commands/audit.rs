//! Audit command - view the signature audit trail.

use colored::Colorize;
use mdsign_audit::{ArchiveReason, AuditEntry, AuditLog};
use mdsign_core::{EnvelopeId, RecordId, RecordKind};

use super::{OutputFormat, print_json};
use crate::theme::Theme;

/// Default number of entries shown by `audit list`.
pub(crate) const DEFAULT_LIST_LIMIT: usize = 20;

/// List the most recent entries, newest last.
pub(crate) fn list_entries(log: &AuditLog, limit: usize, format: OutputFormat) -> anyhow::Result<()> {
    let entries = log.entries()?;
    let skip = entries.len().saturating_sub(limit);
    print_entries("Audit Log", &entries[skip..], format)
}

/// Entries touching one record.
pub(crate) fn record_history(
    log: &AuditLog,
    kind: RecordKind,
    record_id: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let entries = log.history_for_record(kind.as_str(), &RecordId::new(record_id))?;
    print_entries(&format!("History of {kind}/{record_id}"), &entries, format)
}

/// Entries touching one envelope.
pub(crate) fn envelope_history(
    log: &AuditLog,
    envelope_id: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let id: EnvelopeId = envelope_id.parse()?;
    let entries = log.history_for_envelope(id)?;
    print_entries(&format!("History of envelope {id}"), &entries, format)
}

/// Summary counts over the log.
pub(crate) fn show_stats(log: &AuditLog, format: OutputFormat) -> anyhow::Result<()> {
    let stats = log.stats()?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("\n{}", Theme::header("Audit Statistics"));
    println!("{}", Theme::separator());
    println!("{}", Theme::kv("Entries", &stats.total.to_string()));
    println!("{}", Theme::kv("Signatures", &stats.new_signatures.to_string()));
    println!("{}", Theme::kv("Archived", &stats.archived.to_string()));
    for reason in ArchiveReason::ALL {
        if let Some(count) = stats.by_reason.get(&reason) {
            println!("{}", Theme::kv(&format!("  {reason}"), &count.to_string()));
        }
    }
    println!(
        "{}",
        Theme::kv("Preserved", &stats.archived_signatures.to_string())
    );
    println!();
    Ok(())
}

fn print_entries(title: &str, entries: &[AuditEntry], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(entries);
    }

    if entries.is_empty() {
        println!("{}", Theme::info("No audit entries"));
        return Ok(());
    }

    println!("\n{}", Theme::header(title));
    println!(
        "{:<26} {:<10} {}",
        "TIMESTAMP".dimmed(),
        "TYPE".dimmed(),
        "DESCRIPTION".dimmed()
    );
    println!("{}", Theme::separator());
    for entry in entries {
        let kind = match entry {
            AuditEntry::NewSignature(_) => "signed".green(),
            AuditEntry::Archived(_) => "archived".yellow(),
        };
        println!(
            "{:<26} {:<10} {}",
            Theme::dimmed(&entry.recorded_at().to_rfc3339()),
            kind,
            entry.description()
        );
    }
    println!();
    Ok(())
}
