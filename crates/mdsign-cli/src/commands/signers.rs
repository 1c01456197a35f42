//! Signers command - register and inspect signing keys.

use std::path::Path;

use mdsign_core::{SignerId, SignerInfo, SignerRole};
use mdsign_crypto::SigningCapability;
use mdsign_runtime::SignatureRuntime;
use mdsign_telemetry::{RequestContext, RequestGuard};
use serde_json::json;

use super::{OutputFormat, load_signer, print_json};
use crate::theme::Theme;

/// Register the public half of a keyfile.
///
/// `name` and `role` override what the keyfile declares. A role is required
/// from one of the two.
pub(crate) fn register(
    runtime: &SignatureRuntime,
    keyfile: &Path,
    name: Option<String>,
    role: Option<SignerRole>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let _guard = RequestGuard::new(RequestContext::new("signers.register"));
    let key = load_signer(keyfile)?;

    let Some(role) = role.or(key.role) else {
        anyhow::bail!("no signer role given; pass --role or set SIGNER_TYPE in the keyfile");
    };
    let name = name
        .or(key.name)
        .unwrap_or_else(|| format!("signer-{}", key.signer.signer_id().short()));

    let info = runtime
        .registry()
        .register_capability(&key.signer, name, role)?;

    match format {
        OutputFormat::Json => print_json(&signer_json(&info)),
        OutputFormat::Pretty => {
            println!(
                "{}",
                Theme::success(&format!("Registered {} ({})", info.name, info.role))
            );
            print_signer(&info);
            Ok(())
        },
    }
}

/// List registered signers.
pub(crate) fn list(
    runtime: &SignatureRuntime,
    role: Option<SignerRole>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let signers = runtime.registry().list(role)?;

    if format == OutputFormat::Json {
        return print_json(&signers.iter().map(signer_json).collect::<Vec<_>>());
    }

    if signers.is_empty() {
        println!("{}", Theme::info("No signers registered"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Signers"));
    println!(
        "{:<8} {:<24} {:<14} {:<8}",
        Theme::dimmed("ID"),
        Theme::dimmed("NAME"),
        Theme::dimmed("ALGORITHM"),
        Theme::dimmed("ROLE")
    );
    println!("{}", Theme::separator());
    for signer in &signers {
        println!(
            "{:<8} {:<24} {:<14} {:<8}",
            Theme::short_id(&signer.id.to_string()),
            signer.name,
            signer.algorithm.as_str(),
            signer.role.as_str()
        );
    }
    println!();
    Ok(())
}

/// Show one signer.
pub(crate) fn show(runtime: &SignatureRuntime, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let id: SignerId = id.parse()?;
    let info = runtime.registry().lookup(id)?;

    match format {
        OutputFormat::Json => print_json(&signer_json(&info)),
        OutputFormat::Pretty => {
            println!("\n{}", Theme::header(&info.name));
            println!("{}", Theme::separator());
            print_signer(&info);
            println!();
            Ok(())
        },
    }
}

fn print_signer(info: &SignerInfo) {
    println!("{}", Theme::kv("ID", &info.id.to_string()));
    println!("{}", Theme::kv("Algorithm", info.algorithm.as_str()));
    println!("{}", Theme::kv("Role", info.role.as_str()));
    println!("{}", Theme::kv("Created", &info.created_at.to_rfc3339()));
    println!("{}", Theme::kv("Public key", &info.public_key_hex()));
}

fn signer_json(info: &SignerInfo) -> serde_json::Value {
    json!({
        "id": info.id.to_string(),
        "name": info.name,
        "algorithm": info.algorithm.as_str(),
        "role": info.role.as_str(),
        "created_at": info.created_at.to_rfc3339(),
        "public_key": info.public_key_hex(),
    })
}
