use chrono::{DateTime, Local};
use colored::*;
use std::path::PathBuf;

use crate::cleaner::classifier::next_purge_date;
use crate::cleaner::{BatchSummary, PurgePhase, RunOutcome, RunReport};
use crate::common::config::{format_timestamp, Config};
use crate::common::errors::EntryFailure;
use crate::common::format::{self, format_path, format_size, format_size_colored};

/// Print the tail of a run: what the notifications didn't already say
pub fn print_run_report(report: &RunReport) {
    match report.outcome {
        RunOutcome::Cancelled => {
            println!("  {} Setup was cancelled. Nothing was changed.", "ℹ️");
            println!();
            return;
        }
        RunOutcome::Locked => {
            println!(
                "  {} Another stalesweep run is in progress. Nothing was changed.",
                "ℹ️"
            );
            println!();
            return;
        }
        RunOutcome::Completed => {}
    }

    if let Some(ref stage) = report.stage {
        if stage.moved_count() > 0 {
            println!(
                "  {} Staged {} ({})",
                "📦",
                format::format_count(stage.moved_count()).cyan(),
                format_size_colored(stage.moved_bytes()),
            );
        }
        print_failures("could not be staged", &stage.errors);
    }

    match &report.purge {
        PurgePhase::Skipped => {}
        PurgePhase::NotDue { next_due } => {
            let when = next_due
                .map(|d| d.to_string())
                .unwrap_or_else(|| "now".to_string());
            println!("  {} Next purge due: {}", "⏳", when.yellow());
        }
        PurgePhase::Completed(purge) => {
            print_failures("could not be trashed", &purge.errors);
        }
        PurgePhase::Failed { reason, partial } => {
            println!("  {} Purge failed: {}", "✗".red(), reason.red());
            if partial.purged > 0 {
                println!(
                    "    {} already sent to the trash, the rest stay staged",
                    format::format_count(partial.purged)
                );
            }
            print_failures("could not be trashed", &partial.errors);
        }
    }

    if let Some(ref err) = report.persist_error {
        println!(
            "  {} Could not save the purge timestamp: {}",
            "⚠".yellow(),
            err.dimmed()
        );
    }
    println!();
}

fn print_failures(what: &str, errors: &[EntryFailure]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("  {} {} {}:", "⚠".yellow(), format::format_count(errors.len()), what);
    for (i, err) in errors.iter().enumerate().take(10) {
        println!(
            "    {} {}",
            format!("{}.", i + 1).dimmed(),
            err.to_string().dimmed()
        );
    }
    if errors.len() > 10 {
        println!("    ... and {} more", (errors.len() - 10).to_string().dimmed());
    }
}

/// One line: outcome, moved, purged, missing, failed
pub fn print_run_quiet(report: &RunReport) {
    let outcome = match report.outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Cancelled => "cancelled",
        RunOutcome::Locked => "locked",
    };
    let moved = report.stage.as_ref().map(|s| s.moved_count()).unwrap_or(0);
    let stage_failed = report.stage.as_ref().map(|s| s.errors.len()).unwrap_or(0);
    let purge = match &report.purge {
        PurgePhase::Completed(p) | PurgePhase::Failed { partial: p, .. } => Some(p),
        _ => None,
    };
    let (purged, missing, purge_failed) = purge
        .map(|p| (p.purged, p.missing, p.errors.len()))
        .unwrap_or((0, 0, 0));

    println!(
        "{}  {}  {}  {}  {}",
        outcome,
        moved,
        purged,
        missing,
        stage_failed + purge_failed
    );
}

/// Print the dry-run listing for `stage` or `purge`
pub fn print_plan(title: &str, paths: &[PathBuf]) {
    println!();
    println!("  {} {}", "ℹ️", title.bold());
    println!("{}", "─".repeat(60).dimmed());
    if paths.is_empty() {
        println!("  Nothing to do.");
    }
    for path in paths {
        println!("    {} {}", "•".dimmed(), format_path(path));
    }
    println!();
    println!("  {} (dry run, nothing was moved)", format::format_count(paths.len()));
    println!();
}

/// Print the status dashboard
pub fn print_status(config: &Config, batches: &[BatchSummary], now: DateTime<Local>) {
    println!();
    println!("  {} stalesweep Status", "📊");
    println!("{}", "─".repeat(60).dimmed());
    println!();

    format::print_kv("Watched folder", &format_path(&config.watched_dir));
    format::print_kv("Staging root", &format_path(&config.staging_root));
    for exempt in &config.exempt_paths {
        format::print_kv("Exempt", &format_path(exempt));
    }
    format::print_kv(
        "Purge interval",
        &format!("{} day(s)", config.purge_interval_days),
    );

    match config.last_purge {
        Some(last) => {
            format::print_kv("Last purge", &format_timestamp(last));
            if let Some(next) = next_purge_date(config.last_purge, config.purge_interval_days) {
                let label = if next <= now.date_naive() {
                    "due now".yellow().to_string()
                } else {
                    next.to_string()
                };
                format::print_kv("Next purge", &label);
            }
        }
        None => {
            format::print_kv("Last purge", "never");
            format::print_kv("Next purge", &"due now".yellow().to_string());
        }
    }

    println!();
    if batches.is_empty() {
        println!("  {} Staging area is empty.", "✨");
        println!();
        return;
    }

    let total_files: usize = batches.iter().map(|b| b.file_count).sum();
    let total_bytes: u64 = batches.iter().map(|b| b.total_bytes).sum();
    println!(
        "  {} Staged: {} in {} batch(es), {}",
        "📦",
        format::format_count(total_files),
        batches.len(),
        format_size_colored(total_bytes)
    );
    println!();
    println!(
        "  {:<14} {:>8} {:>12}",
        "Batch".dimmed(),
        "Files".dimmed(),
        "Size".dimmed()
    );
    println!("  {}", "─".repeat(36).dimmed());
    for batch in batches {
        println!(
            "  {:<14} {:>8} {:>12}",
            batch.name,
            batch.file_count,
            format_size(batch.total_bytes)
        );
    }
    println!();
}
