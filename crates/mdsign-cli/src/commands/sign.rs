//! Sign command - sign one record or every outstanding record of a kind.

use std::path::Path;

use mdsign_core::{RecordId, RecordKind};
use mdsign_crypto::SigningCapability;
use mdsign_runtime::{RuntimeError, SignOutcome, SignatureRuntime};
use mdsign_telemetry::{RequestContext, RequestGuard};
use serde_json::json;

use super::{OutputFormat, load_signer, print_json};
use crate::theme::Theme;

/// Sign one record with the key in `keyfile`.
pub(crate) fn sign_record(
    runtime: &SignatureRuntime,
    kind: RecordKind,
    record_id: &str,
    keyfile: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let _guard =
        RequestGuard::new(RequestContext::new("sign").with_record(kind.as_str(), record_id));
    let key = load_signer(keyfile)?;
    let record_id = RecordId::new(record_id);

    let outcome = match runtime.sign_record(kind, &record_id, &key.signer) {
        Ok(outcome) => outcome,
        Err(RuntimeError::SignerNotFound(id)) => {
            anyhow::bail!(
                "signer {id} is not registered; run `mdsign signers register --keyfile {}` first",
                keyfile.display()
            );
        },
        Err(e) => return Err(e.into()),
    };

    match format {
        OutputFormat::Json => print_json(&outcome_json(&outcome)),
        OutputFormat::Pretty => {
            print_outcome(&outcome, &key.signer.signer_id().to_string());
            Ok(())
        },
    }
}

/// Sign every record of `kind` the key has not signed at its current version.
pub(crate) fn sign_all(
    runtime: &SignatureRuntime,
    kind: RecordKind,
    keyfile: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let context = RequestContext::new("sign-all");
    let short = context.short_id();
    let _guard = RequestGuard::new(context);
    let key = load_signer(keyfile)?;

    let report = match runtime.sign_outstanding(kind, &key.signer) {
        Ok(report) => report,
        Err(RuntimeError::SignerNotFound(id)) => {
            anyhow::bail!(
                "signer {id} is not registered; run `mdsign signers register --keyfile {}` first",
                keyfile.display()
            );
        },
        Err(e) => return Err(e.into()),
    };

    if format == OutputFormat::Json {
        return print_json(&json!({
            "kind": kind.as_str(),
            "signed": report.signed,
            "already_signed": report.already_signed,
            "failed": report
                .failed
                .iter()
                .map(|f| json!({ "record_id": f.record_id.as_str(), "error": f.error }))
                .collect::<Vec<_>>(),
        }));
    }

    println!("\n{}", Theme::header(&format!("Signed {kind} ({short})")));
    println!("{}", Theme::separator());
    println!("{}", Theme::kv("Signed", &report.signed.to_string()));
    println!(
        "{}",
        Theme::kv("Up to date", &report.already_signed.to_string())
    );
    println!("{}", Theme::kv("Failed", &report.failed.len().to_string()));
    for failure in &report.failed {
        println!(
            "{}",
            Theme::error(&format!("{}: {}", failure.record_id, failure.error))
        );
    }
    println!();

    if !report.failed.is_empty() {
        anyhow::bail!("{} record(s) could not be signed", report.failed.len());
    }
    Ok(())
}

fn outcome_json(outcome: &SignOutcome) -> serde_json::Value {
    json!({
        "kind": outcome.kind.as_str(),
        "record_id": outcome.record_id.as_str(),
        "envelope_id": outcome.envelope_id.to_string(),
        "row_version": outcome.row_version,
        "digest": outcome.digest.to_hex(),
        "status": outcome.status(),
    })
}

fn print_outcome(outcome: &SignOutcome, signer_id: &str) {
    println!(
        "{}",
        Theme::success(&format!(
            "{} {}/{} at version {}",
            Theme::status(outcome.status()),
            outcome.kind,
            outcome.record_id,
            outcome.row_version
        ))
    );
    println!("{}", Theme::kv("Envelope", &outcome.envelope_id.to_string()));
    println!("{}", Theme::kv("Signer", &Theme::short_id(signer_id)));
    println!("{}", Theme::kv("SHA-256", &outcome.digest.to_hex()));
}
