use colored::*;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use crate::common::config::{Config, SetupProvider, SetupReason};
use crate::common::errors::SetupError;
use crate::common::format;

/// Asks for the configuration on the terminal.
///
/// Without a terminal on stdin (cron, launchd) setup is treated as
/// cancelled so an unattended run never blocks waiting for input.
#[derive(Debug, Clone)]
pub struct TerminalSetup {
    defaults: Config,
}

impl TerminalSetup {
    pub fn new(defaults: Config) -> Self {
        Self { defaults }
    }
}

impl SetupProvider for TerminalSetup {
    fn request_config(&self, reason: &SetupReason) -> Result<Option<Config>, SetupError> {
        if !io::stdin().is_terminal() {
            eprintln!(
                "  {} No usable configuration and no terminal to ask on. Run {} first.",
                "⚠".yellow(),
                "stalesweep config init".cyan()
            );
            return Ok(None);
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let config = prompt_config(&mut stdin.lock(), &mut stdout, &self.defaults, reason)?;
        if config.is_none() {
            println!("  {} Setup canceled.", "✗".red());
        }
        Ok(config)
    }
}

/// Interactive form. Empty answers take the shown default; `q` or EOF
/// cancels. Invalid answers are reported and the form starts over.
pub fn prompt_config<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    defaults: &Config,
    reason: &SetupReason,
) -> io::Result<Option<Config>> {
    writeln!(out)?;
    writeln!(out, "  Welcome to the stalesweep setup!")?;
    if let SetupReason::Invalid(why) = reason {
        writeln!(out, "  The existing config could not be used: {}", why)?;
    }
    writeln!(out, "  Press Enter to accept a default, or q to cancel.")?;
    writeln!(out)?;

    loop {
        let Some(watched) = ask(input, out, "Watched folder", &defaults.watched_dir.display().to_string())? else {
            return Ok(None);
        };
        let watched = PathBuf::from(watched);

        // Nested defaults follow whatever folder was picked
        let nested = if watched == defaults.watched_dir {
            defaults.clone()
        } else {
            Config::default_for(&watched)
        };

        let Some(staging) = ask(input, out, "Staging folder", &nested.staging_root.display().to_string())? else {
            return Ok(None);
        };

        let exempt_default = nested
            .exempt_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let Some(exempt) = ask(input, out, "Exempt paths (comma-separated)", &exempt_default)? else {
            return Ok(None);
        };
        let exempt_paths: Vec<PathBuf> = exempt
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let Some(interval) = ask(input, out, "Purge interval (days)", &defaults.purge_interval_days.to_string())? else {
            return Ok(None);
        };
        let interval: i64 = match interval.parse() {
            Ok(days) => days,
            Err(_) => {
                writeln!(out, "  Error: '{}' is not a whole number of days.", interval)?;
                continue;
            }
        };

        match Config::new(watched, staging, exempt_paths, interval) {
            Ok(config) => {
                writeln!(out)?;
                writeln!(
                    out,
                    "  Setup complete! Watching {}",
                    format::format_path(&config.watched_dir)
                )?;
                return Ok(Some(config));
            }
            Err(e) => {
                writeln!(out, "  Error: {}", e)?;
                writeln!(out)?;
            }
        }
    }
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    default: &str,
) -> io::Result<Option<String>> {
    write!(out, "  {} [{}]: ", label, default)?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let answer = line.trim();
    if answer.eq_ignore_ascii_case("q") || answer.eq_ignore_ascii_case("quit") {
        return Ok(None);
    }
    Ok(Some(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    }))
}
