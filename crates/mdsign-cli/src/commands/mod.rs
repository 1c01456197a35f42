//! Command implementations.

pub(crate) mod audit;
pub(crate) mod cleanup;
pub(crate) mod config;
pub(crate) mod export;
pub(crate) mod sign;
pub(crate) mod signers;
pub(crate) mod verify;

use std::path::Path;

use anyhow::Context;
use mdsign_core::SignerRole;
use mdsign_crypto::{Keyfile, LocalSigner};
use serde::Serialize;

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Colored, human-readable text.
    Pretty,
    /// One JSON document on stdout.
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown output format '{other}'; expected pretty or json"),
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A signing key loaded from a keyfile, with the metadata it declared.
pub(crate) struct LoadedKey {
    pub(crate) signer: LocalSigner,
    pub(crate) name: Option<String>,
    pub(crate) role: Option<SignerRole>,
}

/// Load a keyfile and turn it into a signer.
pub(crate) fn load_signer(path: &Path) -> anyhow::Result<LoadedKey> {
    let keyfile =
        Keyfile::load(path).with_context(|| format!("failed to load keyfile {}", path.display()))?;
    let name = keyfile.name.clone();
    let role = keyfile.role;
    Ok(LoadedKey {
        signer: keyfile.into_signer(),
        name,
        role,
    })
}
