use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// stalesweep: stage stale downloads, purge them to the trash later
#[derive(Parser, Debug)]
#[command(
    name = "stalesweep",
    version,
    about = "Stage stale files out of a watched folder and purge them to the trash on a schedule",
    long_about = "stalesweep moves files untouched for more than 24 hours out of a watched\n\
                   folder into dated batches, and sends the batches to the system trash\n\
                   once the purge interval has elapsed. Run it from cron or launchd.",
    after_help = "EXAMPLES:\n  \
        stalesweep config init                 Interactive setup\n  \
        stalesweep config init --defaults      Use ~/Downloads with default folders\n  \
        stalesweep run                         Stage, then purge if due\n  \
        stalesweep stage --dry-run             Show what would be staged\n  \
        stalesweep purge                       Purge everything staged now\n  \
        stalesweep status                      Show batches and next purge date\n  \
        stalesweep schedule --launchd          Print a launchd agent"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use
    #[arg(long, global = true, env = "STALESWEEP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output (debug logging to stderr)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode, minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage stale files, then purge the staging root if the interval has elapsed
    Run {
        /// Pretend the current time is this RFC 3339 timestamp
        #[arg(long, hide = true, value_parser = parse_now)]
        now: Option<DateTime<Local>>,
    },

    /// Stage stale files only
    Stage {
        /// Show what would be staged without moving anything
        #[arg(long)]
        dry_run: bool,

        #[arg(long, hide = true, value_parser = parse_now)]
        now: Option<DateTime<Local>>,
    },

    /// Stage, then purge everything staged regardless of the interval
    Purge {
        /// Show what would be sent to the trash
        #[arg(long)]
        dry_run: bool,

        #[arg(long, hide = true, value_parser = parse_now)]
        now: Option<DateTime<Local>>,
    },

    /// Show configuration, staged batches and the next purge date
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print a scheduler entry that runs stalesweep daily
    Schedule {
        /// Emit a launchd plist instead of a crontab line
        #[arg(long)]
        launchd: bool,

        /// Write the launchd plist to ~/Library/LaunchAgents
        #[arg(long, requires = "launchd")]
        install: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the config file location
    Path,

    /// Create the configuration (interactive unless flags are given)
    Init {
        /// Folder to watch for stale files
        #[arg(long, value_name = "DIR")]
        watched: Option<PathBuf>,

        /// Staging root (default: <watched>/To Be Deleted)
        #[arg(long, value_name = "DIR")]
        staging: Option<PathBuf>,

        /// Exempt path, repeatable (default: <watched>/Files to Back Up)
        #[arg(long = "exempt", value_name = "PATH")]
        exempt: Vec<PathBuf>,

        /// Days between purges
        #[arg(long, value_name = "DAYS")]
        interval: Option<i64>,

        /// Use the default layout under the user's download folder
        #[arg(long, conflicts_with_all = ["watched", "staging", "exempt", "interval"])]
        defaults: bool,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn parse_now(s: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}
