//! mdsign CLI - sign, verify and clean up record signatures.
//!
//! Every command loads the layered configuration, sets up logging from its
//! `[logging]` section, opens the record databases and the audit log, then
//! runs against a [`SignatureRuntime`](mdsign_runtime::SignatureRuntime).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdsign_config::{Config, ResolvedConfig};
use mdsign_core::{RecordKind, SignerRole};
use mdsign_runtime::SignatureRuntime;
use mdsign_runtime::config_bridge::open_runtime;
use mdsign_telemetry::{LogConfig, setup_logging};

mod commands;
mod theme;

use commands::{OutputFormat, audit, cleanup, config, export, sign, signers, verify};
use theme::Theme;

/// mdsign - multi-signer record signatures
#[derive(Parser)]
#[command(name = "mdsign")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an additional configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign one record at its current version
    Sign {
        /// Record kind (gameversions, rhpatches, patchblobs, attachments, signers)
        #[arg(short, long)]
        kind: RecordKind,

        /// Record primary key
        #[arg(short, long)]
        record: String,

        /// Keyfile holding the signing key
        #[arg(long)]
        keyfile: PathBuf,
    },

    /// Sign every record of a kind the key has not yet signed
    SignAll {
        /// Record kind
        #[arg(short, long)]
        kind: RecordKind,

        /// Keyfile holding the signing key
        #[arg(long)]
        keyfile: PathBuf,
    },

    /// Archive and remove orphaned or outdated envelopes
    Cleanup {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Verify the signatures on a record
    Verify {
        /// Record kind
        #[arg(short, long)]
        kind: RecordKind,

        /// Record primary key
        #[arg(short, long)]
        record: String,
    },

    /// Manage registered signers
    Signers {
        #[command(subcommand)]
        command: SignerCommands,
    },

    /// View the signature audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print a signed response carrying records
    Export {
        /// Record kind
        #[arg(short, long)]
        kind: RecordKind,

        /// Record primary keys
        #[arg(short, long = "record", required = true, num_args = 1..)]
        records: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the server signature on a saved response
    VerifyResponse {
        /// Response JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum SignerCommands {
    /// Register the public key of a keyfile
    Register {
        /// Keyfile holding the key
        #[arg(long)]
        keyfile: PathBuf,

        /// Display name (defaults to the keyfile's SIGNER_NAME)
        #[arg(long)]
        name: Option<String>,

        /// Role (defaults to the keyfile's SIGNER_TYPE)
        #[arg(long)]
        role: Option<SignerRole>,
    },
    /// List registered signers
    List {
        /// Only signers with this role
        #[arg(long)]
        role: Option<SignerRole>,
    },
    /// Show one signer
    Show {
        /// Signer UUID
        id: String,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Show the most recent audit entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value_t = audit::DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Show the history of a record or an envelope
    History {
        /// Record kind
        #[arg(short, long, requires = "record", conflicts_with = "envelope")]
        kind: Option<RecordKind>,

        /// Record primary key
        #[arg(short, long, requires = "kind")]
        record: Option<String>,

        /// Envelope UUID
        #[arg(short, long)]
        envelope: Option<String>,
    },
    /// Show audit statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations (TOML, or JSON with --format json)
    Show {
        /// Show only a specific section (e.g. database, signing, logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
    /// Show config file paths being checked
    Paths,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", Theme::error(&format!("{e:#}")));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let format = OutputFormat::parse(&cli.format)?;
    let explicit = cli.config.as_deref();

    // Paths must work even when the configuration does not load.
    if let Commands::Config {
        command: ConfigCommands::Paths,
    } = &cli.command
    {
        return config::show_paths(explicit);
    }

    let resolved = Config::load(explicit)?;
    init_logging(&resolved, cli.verbose);

    let open = || open_runtime(&resolved.config);
    match cli.command {
        Commands::Sign {
            kind,
            record,
            keyfile,
        } => sign::sign_record(&open()?, kind, &record, &keyfile, format),
        Commands::SignAll { kind, keyfile } => sign::sign_all(&open()?, kind, &keyfile, format),
        Commands::Cleanup { dry_run, yes } => cleanup::run_cleanup(&open()?, dry_run, yes, format),
        Commands::Verify { kind, record } => verify::verify_record(&open()?, kind, &record, format),
        Commands::Signers { command } => handle_signers(&open()?, command, format),
        Commands::Audit { command } => handle_audit(&open()?, command, format),
        Commands::Config { command } => handle_config(&resolved, command, explicit, format),
        Commands::Export {
            kind,
            records,
            output,
        } => export::export_records(&open()?, &resolved.config, kind, &records, output.as_deref()),
        Commands::VerifyResponse { file } => export::verify_response(&open()?, &file, format),
    }
}

fn init_logging(resolved: &ResolvedConfig, verbose: bool) {
    let mut log_config = LogConfig::from(&resolved.config.logging);
    if verbose {
        log_config.level = "debug".to_owned();
    }
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("{}", Theme::warning(&format!("logging disabled: {e}")));
    }
}

fn handle_signers(
    runtime: &SignatureRuntime,
    command: SignerCommands,
    format: OutputFormat,
) -> Result<()> {
    match command {
        SignerCommands::Register {
            keyfile,
            name,
            role,
        } => signers::register(runtime, &keyfile, name, role, format),
        SignerCommands::List { role } => signers::list(runtime, role, format),
        SignerCommands::Show { id } => signers::show(runtime, &id, format),
    }
}

fn handle_audit(runtime: &SignatureRuntime, command: AuditCommands, format: OutputFormat) -> Result<()> {
    let log = runtime.audit();
    match command {
        AuditCommands::List { limit } => audit::list_entries(log, limit, format),
        AuditCommands::History {
            kind,
            record,
            envelope,
        } => match (kind, record, envelope) {
            (Some(kind), Some(record), None) => audit::record_history(log, kind, &record, format),
            (None, None, Some(envelope)) => audit::envelope_history(log, &envelope, format),
            _ => anyhow::bail!("Provide --kind and --record, or --envelope"),
        },
        AuditCommands::Stats => audit::show_stats(log, format),
    }
}

fn handle_config(
    resolved: &ResolvedConfig,
    command: ConfigCommands,
    explicit: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match command {
        ConfigCommands::Show { section } => config::show_config(resolved, format, section.as_deref()),
        ConfigCommands::Validate => config::validate_config(resolved),
        ConfigCommands::Paths => config::show_paths(explicit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign() {
        let cli = Cli::try_parse_from([
            "mdsign", "sign", "--kind", "rhpatches", "--record", "rhp-1", "--keyfile", "k.env",
        ])
        .unwrap();
        match cli.command {
            Commands::Sign {
                kind,
                record,
                keyfile,
            } => {
                assert_eq!(kind, RecordKind::Rhpatches);
                assert_eq!(record, "rhp-1");
                assert_eq!(keyfile, PathBuf::from("k.env"));
            },
            _ => panic!("expected sign"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let result = Cli::try_parse_from([
            "mdsign", "verify", "--kind", "widgets", "--record", "w-1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mdsign", "cleanup", "--dry-run", "--format", "json", "--config", "/tmp/m.toml",
        ])
        .unwrap();
        assert_eq!(cli.format, "json");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                dry_run: true,
                yes: false
            }
        ));
    }

    #[test]
    fn test_parse_export_multiple_records() {
        let cli = Cli::try_parse_from([
            "mdsign", "export", "--kind", "gameversions", "--record", "gv-1", "gv-2",
        ])
        .unwrap();
        match cli.command {
            Commands::Export { records, .. } => assert_eq!(records, vec!["gv-1", "gv-2"]),
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_parse_signer_role() {
        let cli = Cli::try_parse_from([
            "mdsign", "signers", "list", "--role", "service",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Signers {
                command: SignerCommands::List {
                    role: Some(SignerRole::Service)
                }
            }
        ));
    }

    #[test]
    fn test_history_requires_record_with_kind() {
        let result = Cli::try_parse_from(["mdsign", "audit", "history", "--kind", "rhpatches"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("yaml").is_err());
    }
}
