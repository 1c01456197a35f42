//! Cleanup command - archive and remove orphaned or outdated envelopes.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::SIGINT;

use mdsign_audit::ArchiveReason;
use mdsign_runtime::{SignatureRuntime, SweepReport};
use mdsign_telemetry::{RequestContext, RequestGuard};

use super::{OutputFormat, print_json};
use crate::theme::Theme;

/// Run a cleanup pass.
///
/// A dry run only classifies. Otherwise the removable envelopes are listed
/// first and, on a terminal, the user confirms before anything is archived.
/// The first Ctrl-C stops the pass between envelopes; a second one exits.
pub(crate) fn run_cleanup(
    runtime: &SignatureRuntime,
    dry_run: bool,
    yes: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let _guard = RequestGuard::new(RequestContext::new("cleanup"));

    let preview = runtime.sweep(true)?;
    if dry_run || preview.removable() == 0 {
        return report(&preview, format);
    }

    if !yes && std::io::stdin().is_terminal() {
        print_report(&preview);
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Archive and delete {} envelope(s)?",
                preview.removable()
            ))
            .default(false)
            .interact()?;
        if !confirm {
            println!("{}", Theme::info("Aborted."));
            return Ok(());
        }
    }

    let swept = runtime.sweeper(Some(interrupt_flag()?)).sweep(false)?;
    report(&swept, format)?;
    if swept.interrupted {
        anyhow::bail!("cleanup interrupted after {} envelope(s)", swept.scanned);
    }
    if swept.failed > 0 {
        anyhow::bail!("{} envelope(s) could not be cleaned up", swept.failed);
    }
    Ok(())
}

fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    // Exit outright if the flag is already set, i.e. on the second Ctrl-C.
    signal_hook::flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&flag))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&flag))?;
    Ok(flag)
}

fn report(report: &SweepReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Pretty => {
            print_report(report);
            Ok(())
        },
    }
}

fn print_report(report: &SweepReport) {
    let title = if report.dry_run {
        "Cleanup (dry run)"
    } else {
        "Cleanup"
    };
    println!("\n{}", Theme::header(title));
    println!("{}", Theme::separator());
    println!("{}", Theme::kv("Scanned", &report.scanned.to_string()));
    println!("{}", Theme::kv("Healthy", &report.healthy.to_string()));
    for reason in ArchiveReason::ALL {
        let count = report.classifications.get(&reason).copied().unwrap_or(0);
        if count > 0 {
            println!("{}", Theme::kv(reason.as_str(), &count.to_string()));
        }
    }
    if !report.dry_run {
        println!("{}", Theme::kv("Archived", &report.archived.to_string()));
        println!("{}", Theme::kv("Deleted", &report.deleted.to_string()));
        if report.retained > 0 {
            println!("{}", Theme::kv("Retained", &report.retained.to_string()));
        }
    }
    if report.interrupted {
        println!("{}", Theme::warning("Stopped before the pass finished"));
    }
    if report.failed > 0 {
        println!(
            "{}",
            Theme::warning(&format!("{} envelope(s) failed", report.failed))
        );
    }
    if report.removable() == 0 {
        println!("{}", Theme::success("Nothing to clean up"));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn test_first_interrupt_sets_stop_flag() {
        let flag = interrupt_flag().unwrap();
        assert!(!flag.load(Ordering::SeqCst));

        signal_hook::low_level::raise(SIGINT).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }
}
