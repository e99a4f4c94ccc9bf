use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::trash::TrashFacility;
use crate::common::config::Config;
use crate::common::errors::{EntryFailure, PurgeError, TrashError};
use crate::common::lock::LOCK_FILE_NAME;

/// Report from a purge operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    /// Entries handed to the trash facility successfully
    pub purged: usize,
    /// Entries already gone when their turn came
    pub missing: usize,
    /// Batch directories removed after being emptied
    pub removed_batches: usize,
    pub errors: Vec<EntryFailure>,
}

impl PurgeReport {
    /// Human-readable summary for the notification sink
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "{} file(s) sent to the trash.\n{} file(s) were missing and skipped.",
            self.purged, self.missing
        );
        if !self.errors.is_empty() {
            msg.push_str(&format!(
                "\n{} file(s) could not be trashed and stay staged.",
                self.errors.len()
            ));
        }
        msg
    }
}

/// Collect every staged file under the staging root, across all batches.
///
/// The run lock is skipped. Exempt paths and the watched directory are
/// never descended into.
/// Entries that cannot be read are returned as failures.
fn walk_staged(config: &Config) -> (Vec<PathBuf>, Vec<EntryFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    if !config.staging_root.exists() {
        return (files, failures);
    }

    let lock_path = config.lock_path();
    let walker = WalkDir::new(&config.staging_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !config.is_purge_barrier(e.path()));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() || entry.path() == lock_path {
                    continue;
                }
                files.push(entry.into_path());
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| config.staging_root.clone());
                failures.push(EntryFailure::new(path, e));
            }
        }
    }

    (files, failures)
}

/// List what a purge would send to the trash, without touching anything
pub fn collect_staged(config: &Config) -> Vec<PathBuf> {
    walk_staged(config).0
}

/// Send every staged entry to the trash, then drop emptied batches.
///
/// Per-entry failures are recorded and the sweep continues. Only an
/// unavailable trash facility fails the whole purge.
pub fn purge(config: &Config, trash: &dyn TrashFacility) -> Result<PurgeReport, PurgeError> {
    if let Err(e) = trash.ensure_available() {
        let reason = e.to_string();
        error!(error = %reason, "trash facility unavailable, purge skipped");
        return Err(PurgeError::Unavailable {
            reason,
            partial: PurgeReport::default(),
        });
    }

    let (entries, walk_failures) = walk_staged(config);
    info!(
        staging_root = %config.staging_root.display(),
        entries = entries.len(),
        "purge started"
    );

    let mut report = match purge_entries(&entries, trash) {
        Ok(report) => report,
        Err(PurgeError::Unavailable { reason, mut partial }) => {
            partial.errors.extend(walk_failures);
            return Err(PurgeError::Unavailable { reason, partial });
        }
    };
    report.errors.extend(walk_failures);
    report.removed_batches = remove_empty_dirs(config);

    info!(
        purged = report.purged,
        missing = report.missing,
        failed = report.errors.len(),
        removed_batches = report.removed_batches,
        "purge finished"
    );
    Ok(report)
}

/// Trash each entry of an already collected list.
///
/// An entry that vanished since it was listed counts as missing, not as
/// an error. If the facility becomes unavailable the sweep stops and the
/// error carries the counts so far.
pub fn purge_entries(
    entries: &[PathBuf],
    trash: &dyn TrashFacility,
) -> Result<PurgeReport, PurgeError> {
    let mut report = PurgeReport::default();

    for path in entries {
        if std::fs::symlink_metadata(path).is_err() {
            debug!(path = %path.display(), "staged entry already gone");
            report.missing += 1;
            continue;
        }

        match trash.send_to_trash(path) {
            Ok(()) => {
                debug!(path = %path.display(), "sent to trash");
                report.purged += 1;
            }
            Err(TrashError::Missing { .. }) => {
                debug!(path = %path.display(), "staged entry vanished during trash");
                report.missing += 1;
            }
            Err(TrashError::Failed { path, reason }) => {
                warn!(path = %path.display(), error = %reason, "failed to trash entry");
                report.errors.push(EntryFailure::new(path, reason));
            }
            Err(TrashError::Unavailable { reason }) => {
                error!(
                    purged = report.purged,
                    remaining = entries.len() - report.purged - report.missing - report.errors.len(),
                    error = %reason,
                    "trash facility went away mid-purge"
                );
                return Err(PurgeError::Unavailable {
                    reason,
                    partial: report,
                });
            }
        }
    }

    Ok(report)
}

/// Remove empty directories below the staging root, deepest first. The root,
/// exempt subtrees and the watched directory are kept. Returns how many
/// were removed.
fn remove_empty_dirs(config: &Config) -> usize {
    let mut removed = 0;
    let dirs: Vec<PathBuf> = WalkDir::new(&config.staging_root)
        .min_depth(1)
        .contents_first(true)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !config.is_purge_barrier(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    for dir in dirs {
        if dir.file_name().is_some_and(|n| n == LOCK_FILE_NAME) {
            continue;
        }
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if is_empty && std::fs::remove_dir(&dir).is_ok() {
            debug!(dir = %dir.display(), "removed empty batch directory");
            removed += 1;
        }
    }
    removed
}
