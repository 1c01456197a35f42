//! Export and verify-response commands - signed API responses.

use std::path::Path;

use anyhow::Context;
use mdsign_config::Config;
use mdsign_core::{RecordId, RecordKind};
use mdsign_runtime::SignatureRuntime;
use mdsign_runtime::config_bridge::load_service_signer;
use mdsign_storage::RecordStore;
use mdsign_telemetry::{RequestContext, RequestGuard};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{OutputFormat, print_json};
use crate::theme::Theme;

/// Largest response file `verify-response` will read.
const MAX_RESPONSE_SIZE: u64 = 16_777_216;

/// Print a signed response carrying the requested records.
///
/// Records that do not exist are skipped with a warning. Unsigned records
/// are included without an entry in `record_signatures`.
pub(crate) fn export_records(
    runtime: &SignatureRuntime,
    cfg: &Config,
    kind: RecordKind,
    record_ids: &[String],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let _guard = RequestGuard::new(RequestContext::new("export"));
    let signer = runtime.response_signer(load_service_signer(cfg)?)?;
    if !signer.has_service_signer() {
        warn!("No service signer configured; the response will not carry a server_signature");
    }

    let mut rows = Vec::with_capacity(record_ids.len());
    let mut keys = Vec::with_capacity(record_ids.len());
    for id in record_ids {
        let id = RecordId::new(id.as_str());
        let Some(record) = runtime.store().get_record(kind, &id)? else {
            warn!(kind = %kind, record_id = %id, "Record not found, skipping");
            continue;
        };
        let fields: Map<String, Value> = record
            .fields()
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        rows.push(Value::Object(fields));
        keys.push((kind, id));
    }

    let payload = json!({ "record_type": kind.as_str(), "records": rows });
    let response = signer.sign_response(payload, &keys)?;
    let text = serde_json::to_string_pretty(&response)?;

    match output {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                Theme::success(&format!("Wrote {} record(s) to {}", keys.len(), path.display()))
            );
        },
        None => println!("{text}"),
    }
    Ok(())
}

/// Check the `server_signature` on a saved response.
pub(crate) fn verify_response(
    runtime: &SignatureRuntime,
    path: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let _guard = RequestGuard::new(RequestContext::new("verify-response"));
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    if size > MAX_RESPONSE_SIZE {
        anyhow::bail!(
            "{} is {size} bytes, exceeding the {MAX_RESPONSE_SIZE} byte limit",
            path.display()
        );
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let response: Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not JSON", path.display()))?;

    let signer = runtime.response_signer(None)?;
    let valid = signer.verify_response(&response)?;

    match format {
        OutputFormat::Json => print_json(&json!({ "valid": valid }))?,
        OutputFormat::Pretty if valid => {
            println!("{}", Theme::success("Server signature is valid"));
        },
        OutputFormat::Pretty => println!("{}", Theme::error("Server signature is missing or invalid")),
    }

    if !valid {
        anyhow::bail!("response signature did not verify");
    }
    Ok(())
}
