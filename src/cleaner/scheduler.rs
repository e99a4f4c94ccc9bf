use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::classifier::{is_purge_due, next_purge_date};
use super::notify::{Notifier, PURGE_FAILED_TITLE, PURGE_TITLE, STAGE_TITLE};
use super::purger::{self, PurgeReport};
use super::staging::{self, StageReport};
use super::trash::TrashFacility;
use crate::common::config::{Config, ConfigStore, SetupProvider, SetupReason};
use crate::common::errors::{PurgeError, SetupError, SweepError};
use crate::common::lock::RunLock;

/// Which phases a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Stage, then purge if the interval has elapsed
    #[default]
    Full,
    /// Stage and stop
    StageOnly,
    /// Stage, then purge regardless of the interval
    ForcePurge,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All requested phases ran (individual entries may still have failed)
    Completed,
    /// Setup was cancelled; nothing was written
    Cancelled,
    /// Another run holds the lock; nothing was touched
    Locked,
}

/// What happened in the purge phase
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurgePhase {
    /// Not attempted (stage-only run, cancelled or locked)
    Skipped,
    NotDue { next_due: Option<NaiveDate> },
    Completed(PurgeReport),
    /// The trash facility was unavailable. `partial` counts what was
    /// trashed before it went away; everything else is still staged.
    Failed { reason: String, partial: PurgeReport },
}

/// Everything one run did, for output and notifications. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Local>,
    pub stage: Option<StageReport>,
    pub purge: PurgePhase,
    pub last_purge: Option<DateTime<Local>>,
    pub config_saved: bool,
    pub persist_error: Option<String>,
}

impl RunReport {
    fn new(outcome: RunOutcome, started_at: DateTime<Local>) -> Self {
        Self {
            outcome,
            started_at,
            stage: None,
            purge: PurgePhase::Skipped,
            last_purge: None,
            config_saved: false,
            persist_error: None,
        }
    }

    pub fn purge_failed(&self) -> bool {
        matches!(self.purge, PurgePhase::Failed { .. })
    }

    pub fn purge_report(&self) -> Option<&PurgeReport> {
        match &self.purge {
            PurgePhase::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// State carried between phases once a config and the lock are held
struct RunContext {
    config: Config,
    _lock: RunLock,
    report: RunReport,
    /// Config changed and must be written back
    dirty: bool,
}

enum RunState {
    Idle,
    Staging(RunContext),
    PurgeCheck(RunContext),
    Purging(RunContext),
    PersistConfig(RunContext),
    Done(RunReport),
}

/// Drives one run: Idle → Staging → PurgeCheck → [Purging] → PersistConfig.
pub struct Scheduler<'a> {
    store: &'a ConfigStore,
    setup: &'a dyn SetupProvider,
    notifier: &'a dyn Notifier,
    trash: &'a dyn TrashFacility,
    options: RunOptions,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        store: &'a ConfigStore,
        setup: &'a dyn SetupProvider,
        notifier: &'a dyn Notifier,
        trash: &'a dyn TrashFacility,
    ) -> Self {
        Self {
            store,
            setup,
            notifier,
            trash,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Perform one run against the wall-clock instant `now`
    pub fn run(&self, now: DateTime<Local>) -> Result<RunReport, SweepError> {
        let mut state = RunState::Idle;
        loop {
            state = match state {
                RunState::Done(report) => return Ok(report),
                other => self.step(other, now)?,
            };
        }
    }

    fn step(&self, state: RunState, now: DateTime<Local>) -> Result<RunState, SweepError> {
        match state {
            RunState::Idle => {
                let Some(config) = self.resolve_config()? else {
                    info!("setup cancelled, nothing to do");
                    return Ok(RunState::Done(RunReport::new(RunOutcome::Cancelled, now)));
                };

                std::fs::create_dir_all(&config.staging_root).map_err(|source| {
                    SweepError::StagingRoot {
                        path: config.staging_root.clone(),
                        source,
                    }
                })?;

                let Some(lock) = RunLock::try_acquire(&config.lock_path())? else {
                    info!(lock = %config.lock_path().display(), "another run is in progress, skipping");
                    return Ok(RunState::Done(RunReport::new(RunOutcome::Locked, now)));
                };

                let mut report = RunReport::new(RunOutcome::Completed, now);
                report.last_purge = config.last_purge;
                Ok(RunState::Staging(RunContext {
                    config,
                    _lock: lock,
                    report,
                    dirty: false,
                }))
            }

            RunState::Staging(mut ctx) => {
                let stage = staging::stage(&ctx.config, now, self.options.show_progress)?;
                self.notifier.notify(STAGE_TITLE, &stage.summary());
                ctx.report.stage = Some(stage);

                if self.options.mode == RunMode::StageOnly {
                    Ok(RunState::Done(ctx.report))
                } else {
                    Ok(RunState::PurgeCheck(ctx))
                }
            }

            RunState::PurgeCheck(mut ctx) => {
                let config = &ctx.config;
                let due = self.options.mode == RunMode::ForcePurge
                    || is_purge_due(config.last_purge, config.purge_interval_days, now);

                if due {
                    Ok(RunState::Purging(ctx))
                } else {
                    let next_due = next_purge_date(config.last_purge, config.purge_interval_days);
                    debug!(?next_due, "purge not due");
                    ctx.report.purge = PurgePhase::NotDue { next_due };
                    Ok(RunState::Done(ctx.report))
                }
            }

            RunState::Purging(mut ctx) => {
                match purger::purge(&ctx.config, self.trash) {
                    Ok(purge) => {
                        self.notifier.notify(PURGE_TITLE, &purge.summary());
                        // Advances even when entries failed; those wait for the next interval
                        ctx.config.last_purge = Some(now);
                        ctx.report.last_purge = Some(now);
                        ctx.dirty = true;
                        ctx.report.purge = PurgePhase::Completed(purge);
                    }
                    Err(PurgeError::Unavailable { reason, partial }) => {
                        // last_purge stays put so the next run finishes the sweep
                        self.notifier.notify(PURGE_FAILED_TITLE, &failed_summary(&reason, &partial));
                        ctx.report.purge = PurgePhase::Failed { reason, partial };
                    }
                }
                Ok(RunState::PersistConfig(ctx))
            }

            RunState::PersistConfig(mut ctx) => {
                if ctx.dirty {
                    match self.store.save(&ctx.config) {
                        Ok(()) => {
                            debug!(path = %self.store.path().display(), "config saved");
                            ctx.report.config_saved = true;
                        }
                        Err(e) => {
                            error!(error = %e, "failed to persist last purge timestamp");
                            ctx.report.persist_error = Some(e.to_string());
                        }
                    }
                }
                Ok(RunState::Done(ctx.report))
            }

            RunState::Done(report) => Ok(RunState::Done(report)),
        }
    }

    /// Load the stored config, falling back to setup when it is absent or
    /// unusable. `None` means setup was cancelled.
    fn resolve_config(&self) -> Result<Option<Config>, SweepError> {
        let reason = match self.store.load() {
            Ok(Some(config)) => return Ok(Some(config)),
            Ok(None) => SetupReason::Missing,
            Err(e) if e.is_invalid_record() => {
                warn!(error = %e, "stored config is unusable");
                SetupReason::Invalid(e.to_string())
            }
            Err(e) => return Err(e.into()),
        };

        info!(?reason, "requesting configuration from setup");
        let Some(config) = self.setup.request_config(&reason)? else {
            return Ok(None);
        };
        config.validate().map_err(SetupError::from)?;
        self.store.save(&config)?;
        info!(path = %self.store.path().display(), "configuration saved");
        Ok(Some(config))
    }
}

/// Notification text for a purge the trash facility cut short
fn failed_summary(reason: &str, partial: &PurgeReport) -> String {
    if partial.purged == 0 && partial.missing == 0 && partial.errors.is_empty() {
        return format!("Purge skipped: {}\nStaged files were left in place.", reason);
    }
    format!(
        "Purge stopped partway: {}\n{} file(s) sent to the trash before it stopped.\nThe rest stay staged for the next run.",
        reason, partial.purged
    )
}

/// crontab entry running the job every day at noon
pub fn cron_line(binary: &Path, config_path: &Path) -> String {
    format!(
        "0 12 * * * '{}' --config '{}' --quiet run",
        binary.display(),
        config_path.display()
    )
}

/// Generate a launchd plist that runs `stalesweep run` daily at noon.
///
/// Install to ~/Library/LaunchAgents/ and load with launchctl.
pub fn generate_launchd_plist(binary: &Path, config_path: &Path, logs_dir: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>com.stalesweep.run</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>--config</string>
        <string>{}</string>
        <string>--quiet</string>
        <string>run</string>
    </array>
    <key>StartCalendarInterval</key>
    <dict>
        <key>Hour</key>
        <integer>12</integer>
        <key>Minute</key>
        <integer>0</integer>
    </dict>
    <key>StandardOutPath</key>
    <string>{}/launchd.log</string>
    <key>StandardErrorPath</key>
    <string>{}/launchd-error.log</string>
</dict>
</plist>"#,
        binary.display(),
        config_path.display(),
        logs_dir.display(),
        logs_dir.display(),
    )
}

/// Get the path where the launchd plist should be installed
pub fn launchd_plist_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join("Library/LaunchAgents/com.stalesweep.run.plist")
}
