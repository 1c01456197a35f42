//! Verify command - check every signature on a record's current envelope.

use colored::Colorize;
use mdsign_core::{RecordId, RecordKind};
use mdsign_runtime::SignatureRuntime;
use mdsign_telemetry::{RequestContext, RequestGuard};

use super::{OutputFormat, print_json};
use crate::theme::Theme;

/// Verify a record. Fails when any signature is invalid.
pub(crate) fn verify_record(
    runtime: &SignatureRuntime,
    kind: RecordKind,
    record_id: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let _guard =
        RequestGuard::new(RequestContext::new("verify").with_record(kind.as_str(), record_id));
    let verification = runtime.verify_record(kind, &RecordId::new(record_id))?;

    if format == OutputFormat::Json {
        print_json(&verification)?;
    } else {
        println!(
            "\n{}",
            Theme::header(&format!("{kind}/{record_id} @ version {}", verification.row_version))
        );
        println!("{}", Theme::separator());
        println!("{}", Theme::kv("SHA-256", &verification.digest.to_hex()));

        match &verification.envelope {
            None => println!("{}", Theme::warning("No signatures")),
            Some(envelope) => {
                println!("{}", Theme::kv("Envelope", &envelope.id.to_string()));
                println!(
                    "{}",
                    Theme::kv("Signed at", &format!("version {}", envelope.signed_row_version))
                );
                if !verification.current {
                    println!(
                        "{}",
                        Theme::warning("Envelope is outdated; the record changed after signing")
                    );
                }
                println!();
                for entry in &verification.entries {
                    let mark = if entry.valid {
                        "VALID".green().to_string()
                    } else {
                        "INVALID".red().to_string()
                    };
                    let name = entry.signer_name.as_deref().unwrap_or("unknown");
                    println!(
                        "  {mark:<8} {} {:<20} {:<10} {}",
                        Theme::short_id(&entry.signer_id.to_string()),
                        name,
                        entry.algorithm,
                        Theme::dimmed(&entry.signed_at.to_rfc3339())
                    );
                    if let Some(problem) = &entry.problem {
                        println!("           {}", Theme::dimmed(problem));
                    }
                }
            },
        }
        println!();
    }

    if !verification.all_valid() {
        anyhow::bail!("{kind}/{record_id} is not fully signed at its current version");
    }
    Ok(())
}
