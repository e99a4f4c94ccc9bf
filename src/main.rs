use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stalesweep::cleaner::{
    self, purger, scheduler, staging, LogNotifier, Notifier, PurgePhase, RunMode, RunOptions,
    Scheduler, SystemTrash,
};
use stalesweep::cli::args::{Cli, Commands, CompletionShell, ConfigAction, OutputFormat};
use stalesweep::cli::notify::ConsoleNotifier;
use stalesweep::cli::output;
use stalesweep::cli::setup::TerminalSetup;
use stalesweep::common::config::{
    format_timestamp, Config, ConfigStore, SetupProvider, SetupReason, DEFAULT_PURGE_INTERVAL_DAYS,
};
use stalesweep::common::format;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let store = match cli.config {
        Some(ref path) => ConfigStore::new(path),
        None => ConfigStore::at_default_location(),
    };

    let file_log = matches!(
        cli.command,
        Commands::Run { .. } | Commands::Stage { .. } | Commands::Purge { .. }
    );
    let _log_guard = init_logging(&cli, file_log.then(|| store.logs_dir()).as_deref());

    match &cli.command {
        Commands::Run { now } => cmd_run(&cli, &store, RunMode::Full, *now),

        Commands::Stage { dry_run, now } => {
            if *dry_run {
                cmd_stage_plan(&cli, &store, *now)
            } else {
                cmd_run(&cli, &store, RunMode::StageOnly, *now)
            }
        }

        Commands::Purge { dry_run, now } => {
            if *dry_run {
                cmd_purge_plan(&cli, &store)
            } else {
                cmd_run(&cli, &store, RunMode::ForcePurge, *now)
            }
        }

        Commands::Status => cmd_status(&cli, &store),

        Commands::Config { action } => cmd_config(&cli, &store, action),

        Commands::Schedule { launchd, install } => cmd_schedule(&store, *launchd, *install),

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                CompletionShell::Bash => clap_complete::Shell::Bash,
                CompletionShell::Zsh => clap_complete::Shell::Zsh,
                CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "stalesweep", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// stderr logging under --verbose, plus a daily log file for runs
fn init_logging(cli: &Cli, logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_directive = if cli.verbose {
        "stalesweep=debug"
    } else {
        "stalesweep=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = cli
        .verbose
        .then(|| fmt::layer().with_writer(std::io::stderr));

    let (file_layer, guard) = match logs_dir.map(|dir| (dir, std::fs::create_dir_all(dir))) {
        Some((dir, Ok(()))) => {
            let appender = tracing_appender::rolling::daily(dir, "stalesweep.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn is_human(cli: &Cli) -> bool {
    matches!(cli.format, OutputFormat::Human) && !cli.quiet
}

fn load_config(store: &ConfigStore) -> Result<Config> {
    store.load()?.ok_or_else(|| {
        anyhow::anyhow!(
            "No configuration found at {}. Run 'stalesweep config init' first.",
            store.path().display()
        )
    })
}

// ─── Run / Stage / Purge ──────────────────────────────────────────────────────

fn cmd_run(
    cli: &Cli,
    store: &ConfigStore,
    mode: RunMode,
    now: Option<DateTime<Local>>,
) -> Result<()> {
    let now = now.unwrap_or_else(Local::now);
    let human = is_human(cli);

    let notifier: &dyn Notifier = if human { &ConsoleNotifier } else { &LogNotifier };
    let setup = TerminalSetup::new(Config::default_for_user());
    let trash = SystemTrash;

    let report = Scheduler::new(store, &setup, notifier, &trash)
        .with_options(RunOptions {
            mode,
            show_progress: human,
        })
        .run(now)
        .context("Cleanup run failed")?;

    match cli.format {
        OutputFormat::Human => {
            if !cli.quiet {
                output::print_run_report(&report);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Quiet => output::print_run_quiet(&report),
    }

    if let PurgePhase::Failed { reason, .. } = &report.purge {
        anyhow::bail!("Purge phase failed: {}", reason);
    }
    Ok(())
}

fn cmd_stage_plan(cli: &Cli, store: &ConfigStore, now: Option<DateTime<Local>>) -> Result<()> {
    let config = load_config(store)?;
    let now = now.unwrap_or_else(Local::now);
    let planned = staging::plan(&config, now)?;
    print_plan(cli, "Files that would be staged", &planned)
}

fn cmd_purge_plan(cli: &Cli, store: &ConfigStore) -> Result<()> {
    let config = load_config(store)?;
    let planned = purger::collect_staged(&config);
    print_plan(cli, "Files that would be sent to the trash", &planned)
}

fn print_plan(cli: &Cli, title: &str, planned: &[PathBuf]) -> Result<()> {
    match cli.format {
        OutputFormat::Human => output::print_plan(title, planned),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(planned)?),
        OutputFormat::Quiet => {
            for path in planned {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

// ─── Status ───────────────────────────────────────────────────────────────────

fn cmd_status(cli: &Cli, store: &ConfigStore) -> Result<()> {
    let config = load_config(store)?;
    let batches = cleaner::list_batches(&config).with_context(|| {
        format!(
            "Failed to read staging root: {}",
            config.staging_root.display()
        )
    })?;
    let now = Local::now();
    let next_due = cleaner::classifier::next_purge_date(config.last_purge, config.purge_interval_days);

    match cli.format {
        OutputFormat::Human => output::print_status(&config, &batches, now),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "config": config.to_raw(),
                "purge_due": cleaner::is_purge_due(config.last_purge, config.purge_interval_days, now),
                "next_purge": next_due,
                "batches": batches,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Quiet => {
            let files: usize = batches.iter().map(|b| b.file_count).sum();
            let bytes: u64 = batches.iter().map(|b| b.total_bytes).sum();
            let next = next_due
                .map(|d| d.to_string())
                .unwrap_or_else(|| "now".to_string());
            println!("{}  {}  {}  {}", batches.len(), files, format::format_size(bytes), next);
        }
    }
    Ok(())
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(cli: &Cli, store: &ConfigStore, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let Some(raw) = store.load_raw()? else {
                println!(
                    "  No configuration at {}. Run {} to create one.",
                    store.path().display(),
                    "stalesweep config init".cyan()
                );
                return Ok(());
            };
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&raw)?),
                _ => print!("{}", toml::to_string_pretty(&raw)?),
            }
            Ok(())
        }

        ConfigAction::Path => {
            println!("{}", store.path().display());
            Ok(())
        }

        ConfigAction::Init {
            watched,
            staging,
            exempt,
            interval,
            defaults,
            force,
        } => {
            if store.path().exists() && !force {
                anyhow::bail!(
                    "Configuration already exists at {}. Use --force to overwrite.",
                    store.path().display()
                );
            }

            let from_flags = watched.is_some() || staging.is_some() || !exempt.is_empty() || interval.is_some();
            let config = if *defaults {
                Config::default_for_user()
            } else if from_flags {
                let watched = watched
                    .clone()
                    .context("--watched is required when configuring with flags")?;
                let base = Config::default_for(&watched);
                Config::new(
                    watched,
                    staging.clone().unwrap_or(base.staging_root),
                    if exempt.is_empty() { base.exempt_paths } else { exempt.clone() },
                    interval.unwrap_or(i64::from(DEFAULT_PURGE_INTERVAL_DAYS)),
                )?
            } else {
                let setup = TerminalSetup::new(Config::default_for_user());
                match setup.request_config(&SetupReason::Missing)? {
                    Some(config) => config,
                    None => return Ok(()),
                }
            };

            config.validate()?;
            store.save(&config)?;
            std::fs::create_dir_all(&config.staging_root).with_context(|| {
                format!(
                    "Failed to create staging root: {}",
                    config.staging_root.display()
                )
            })?;

            println!(
                "  {} Configuration saved to {}",
                "✓".green(),
                format::format_path(store.path())
            );
            println!(
                "  Watching {}, purging every {} day(s)",
                format::format_path(&config.watched_dir),
                config.purge_interval_days
            );
            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let mut raw = store.load_raw()?.ok_or_else(|| {
                anyhow::anyhow!("No configuration found. Run 'stalesweep config init' first.")
            })?;
            match key.as_str() {
                "watched_directory" => raw.watched_directory = PathBuf::from(value),
                "staging_root" => raw.staging_root = PathBuf::from(value),
                "exempt_paths" => {
                    raw.exempt_paths = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                }
                "purge_interval_days" => {
                    raw.purge_interval_days = value
                        .parse()
                        .with_context(|| format!("Not a whole number of days: {}", value))?
                }
                "last_purge_timestamp" => {
                    raw.last_purge_timestamp = (!value.trim().is_empty()).then(|| value.clone())
                }
                _ => anyhow::bail!("Unknown config key: {}", key),
            }

            let config = Config::from_raw(raw)?;
            store.save(&config)?;
            println!("  {} Set {} = {}", "✓".green(), key, value);
            if let Some(last) = config.last_purge {
                println!("  Last purge now reads {}", format_timestamp(last));
            }
            Ok(())
        }
    }
}

// ─── Schedule ─────────────────────────────────────────────────────────────────

fn cmd_schedule(store: &ConfigStore, launchd: bool, install: bool) -> Result<()> {
    let binary = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("stalesweep"));

    if !launchd {
        println!("{}", scheduler::cron_line(&binary, store.path()));
        return Ok(());
    }

    let plist = scheduler::generate_launchd_plist(&binary, store.path(), &store.logs_dir());
    if !install {
        println!("{}", plist);
        return Ok(());
    }

    let plist_path = scheduler::launchd_plist_path();
    if let Some(parent) = plist_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&plist_path, &plist)
        .with_context(|| format!("Failed to write {}", plist_path.display()))?;

    println!("  {} Installed launchd agent: {}", "✓".green(), plist_path.display());
    println!(
        "  {} Load with: {}",
        "💡",
        format!("launchctl load {}", plist_path.display()).cyan()
    );
    println!("  stalesweep will run daily at 12:00.");
    println!();
    Ok(())
}
