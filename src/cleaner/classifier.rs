use chrono::{DateTime, Days, Duration, Local, NaiveDate};
use std::path::{Path, PathBuf};

use crate::common::config::Config;

/// Files untouched for longer than this are staged
pub const STAGING_AGE_THRESHOLD_HOURS: i64 = 24;

/// Date format used for batch directory names
pub const BATCH_DATE_FORMAT: &str = "%Y-%m-%d";

/// A direct child of the watched directory, as seen at scan time
#[derive(Debug, Clone)]
pub struct WatchedEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub modified: DateTime<Local>,
}

impl WatchedEntry {
    /// Read metadata for `path` itself. A symlink is judged by the link's
    /// own mtime and is never a directory, so it is staged (moved) as a link.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            is_dir: metadata.is_dir(),
            modified: DateTime::<Local>::from(metadata.modified()?),
        })
    }

    pub fn age(&self, now: DateTime<Local>) -> Duration {
        now - self.modified
    }
}

/// A regular file outside the staging root and exempt paths, untouched
/// for strictly more than 24 hours.
pub fn is_staging_eligible(entry: &WatchedEntry, config: &Config, now: DateTime<Local>) -> bool {
    !entry.is_dir
        && !config.is_staging_root(&entry.path)
        && !config.is_exempt(&entry.path)
        && entry.age(now) > Duration::hours(STAGING_AGE_THRESHOLD_HOURS)
}

/// Whole calendar days between two instants, in local time
pub fn calendar_days_between(earlier: DateTime<Local>, later: DateTime<Local>) -> i64 {
    (later.date_naive() - earlier.date_naive()).num_days()
}

/// Due when there is no previous purge, or at least `interval_days`
/// calendar days have passed since it.
pub fn is_purge_due(
    last_purge: Option<DateTime<Local>>,
    interval_days: u32,
    now: DateTime<Local>,
) -> bool {
    match last_purge {
        None => true,
        Some(last) => calendar_days_between(last, now) >= i64::from(interval_days),
    }
}

/// First calendar date on which a purge becomes due.
/// `None` when no purge has happened yet (a purge is due right away).
/// Saturates at the last representable date.
pub fn next_purge_date(last_purge: Option<DateTime<Local>>, interval_days: u32) -> Option<NaiveDate> {
    last_purge.map(|last| {
        last.date_naive()
            .checked_add_days(Days::new(u64::from(interval_days)))
            .unwrap_or(NaiveDate::MAX)
    })
}

/// Batch directory name for files staged at `now`
pub fn batch_name(now: DateTime<Local>) -> String {
    now.format(BATCH_DATE_FORMAT).to_string()
}
