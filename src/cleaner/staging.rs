use chrono::{DateTime, Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::classifier::{batch_name, is_staging_eligible, WatchedEntry, BATCH_DATE_FORMAT};
use crate::common::config::Config;
use crate::common::errors::{EntryFailure, StageError};
use crate::common::format;
use crate::common::lock::LOCK_FILE_NAME;

/// A file that was moved into a batch
#[derive(Debug, Clone, Serialize)]
pub struct StagedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    pub size_bytes: u64,
}

/// Report from a staging pass
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// Batch the files went into (may not exist if nothing moved)
    pub batch_dir: PathBuf,
    pub moved: Vec<StagedFile>,
    /// Files younger than the age threshold
    pub skipped_recent: usize,
    /// The staging root and exempt paths
    pub skipped_exempt: usize,
    pub skipped_dirs: usize,
    pub errors: Vec<EntryFailure>,
}

impl StageReport {
    fn new(batch_dir: PathBuf) -> Self {
        Self {
            batch_dir,
            moved: Vec::new(),
            skipped_recent: 0,
            skipped_exempt: 0,
            skipped_dirs: 0,
            errors: Vec::new(),
        }
    }

    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    pub fn moved_bytes(&self) -> u64 {
        self.moved.iter().map(|f| f.size_bytes).sum()
    }

    /// Human-readable summary for the notification sink
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "{} file(s) moved to '{}'.",
            self.moved_count(),
            self.batch_dir.display()
        );
        if !self.errors.is_empty() {
            msg.push_str(&format!(
                "\n{} file(s) could not be moved and were left in place.",
                self.errors.len()
            ));
        }
        msg
    }
}

/// How one child of the watched directory is treated
#[derive(Debug)]
enum Disposition {
    Exempt,
    Directory,
    Recent,
    Eligible(WatchedEntry),
    Vanished,
    Unreadable(io::Error),
}

fn classify(path: &Path, config: &Config, now: DateTime<Local>) -> Disposition {
    if config.is_staging_root(path) || config.is_exempt(path) {
        return Disposition::Exempt;
    }

    let entry = match WatchedEntry::from_path(path) {
        Ok(entry) => entry,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Disposition::Vanished,
        Err(e) => return Disposition::Unreadable(e),
    };

    if entry.is_dir {
        Disposition::Directory
    } else if is_staging_eligible(&entry, config, now) {
        Disposition::Eligible(entry)
    } else {
        Disposition::Recent
    }
}

/// List the immediate children of the watched directory, sorted.
/// Unreadable directory entries are returned as failures.
fn read_watched(config: &Config) -> Result<(Vec<PathBuf>, Vec<EntryFailure>), StageError> {
    let read_dir = std::fs::read_dir(&config.watched_dir).map_err(|source| {
        StageError::ReadWatched {
            path: config.watched_dir.clone(),
            source,
        }
    })?;

    let mut children = Vec::new();
    let mut failures = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => children.push(entry.path()),
            Err(e) => failures.push(EntryFailure::new(&config.watched_dir, e)),
        }
    }
    children.sort();
    Ok((children, failures))
}

/// List the files a staging pass at `now` would move, without moving them
pub fn plan(config: &Config, now: DateTime<Local>) -> Result<Vec<PathBuf>, StageError> {
    let (children, _) = read_watched(config)?;
    Ok(children
        .into_iter()
        .filter_map(|path| match classify(&path, config, now) {
            Disposition::Eligible(entry) => Some(entry.path),
            _ => None,
        })
        .collect())
}

/// Move every stale file from the watched directory into today's batch.
///
/// Only the watched directory itself being unreadable is an error; any
/// single entry that fails is recorded in the report and skipped.
pub fn stage(
    config: &Config,
    now: DateTime<Local>,
    show_progress: bool,
) -> Result<StageReport, StageError> {
    let batch_dir = config.staging_root.join(batch_name(now));
    let mut report = StageReport::new(batch_dir.clone());

    let (children, failures) = read_watched(config)?;
    report.errors.extend(failures);

    info!(
        watched = %config.watched_dir.display(),
        entries = children.len(),
        "staging pass started"
    );

    let pb = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} Staging... {msg}") {
            pb.set_style(style);
        }
        Some(pb)
    } else {
        None
    };

    for path in children {
        if let Some(ref pb) = pb {
            pb.set_message(format::truncate(&format::format_path(&path), 40));
            pb.tick();
        }

        match classify(&path, config, now) {
            Disposition::Exempt => {
                debug!(path = %path.display(), "skipping exempt path");
                report.skipped_exempt += 1;
            }
            Disposition::Directory => {
                debug!(path = %path.display(), "skipping directory");
                report.skipped_dirs += 1;
            }
            Disposition::Recent => report.skipped_recent += 1,
            Disposition::Vanished => {
                debug!(path = %path.display(), "entry vanished before staging");
            }
            Disposition::Unreadable(e) => {
                warn!(path = %path.display(), error = %e, "cannot read entry metadata");
                report.errors.push(EntryFailure::new(&path, e));
            }
            Disposition::Eligible(entry) => match stage_file(&entry.path, &batch_dir) {
                Ok(staged) => {
                    debug!(from = %staged.from.display(), to = %staged.to.display(), "staged");
                    report.moved.push(staged);
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "failed to stage file");
                    report.errors.push(EntryFailure::new(&entry.path, e));
                }
            },
        }
    }

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    info!(
        moved = report.moved_count(),
        failed = report.errors.len(),
        batch = %report.batch_dir.display(),
        "staging pass finished"
    );

    Ok(report)
}

/// Move a single file into the batch, creating the batch on first use
fn stage_file(original: &Path, batch_dir: &Path) -> io::Result<StagedFile> {
    let file_name = original.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let size_bytes = std::fs::symlink_metadata(original)?.len();

    std::fs::create_dir_all(batch_dir)?;
    let staged = unique_destination(batch_dir, file_name);
    move_file(original, &staged)?;

    Ok(StagedFile {
        from: original.to_path_buf(),
        to: staged,
        size_bytes,
    })
}

fn occupied(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Pick a free name in `dir`: `name.ext`, then `name (1).ext`, `name (2).ext`, ...
pub fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !occupied(&candidate) {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name);
    let ext = name.extension();

    let mut n: u64 = 1;
    loop {
        let mut numbered = OsString::from(stem);
        numbered.push(format!(" ({})", n));
        if let Some(ext) = ext {
            numbered.push(".");
            numbered.push(ext);
        }
        let candidate = dir.join(numbered);
        if !occupied(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Rename, falling back to copy + remove when rename is not possible
/// (typically a staging root on another filesystem). Symlinks are only
/// ever renamed, never copied through.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match std::fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
        Err(e) => e,
    };
    if std::fs::symlink_metadata(from)?.file_type().is_symlink() {
        return Err(rename_err);
    }

    debug!(from = %from.display(), error = %rename_err, "rename failed, copying instead");
    copy_then_remove(from, to, |path| std::fs::remove_file(path))
}

/// Copy `from` into a new file at `to`, then delete `from` with
/// `remove_source`. Never overwrites `to`. If the source cannot be
/// removed the copy is deleted again, so the file is never in both places.
fn copy_then_remove<F>(from: &Path, to: &Path, remove_source: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let mut src = File::open(from)?;
    let src_meta = src.metadata()?;
    let mut dst = OpenOptions::new().write(true).create_new(true).open(to)?;

    if let Err(e) = io::copy(&mut src, &mut dst) {
        drop(dst);
        let _ = std::fs::remove_file(to);
        return Err(e);
    }
    if let Ok(modified) = src_meta.modified() {
        let _ = dst.set_modified(modified);
    }
    drop(dst);
    let _ = std::fs::set_permissions(to, src_meta.permissions());

    if let Err(e) = remove_source(from) {
        let _ = std::fs::remove_file(to);
        return Err(io::Error::new(
            e.kind(),
            format!("copied to staging but could not remove original: {}", e),
        ));
    }

    Ok(())
}

/// A dated batch currently sitting in the staging root
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub name: String,
    pub path: PathBuf,
    /// Parsed from the directory name; `None` for foreign directories
    pub date: Option<NaiveDate>,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// List the batches in the staging root, oldest first
pub fn list_batches(config: &Config) -> io::Result<Vec<BatchSummary>> {
    let read_dir = match std::fs::read_dir(&config.staging_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut batches = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_dir() || entry.file_name() == LOCK_FILE_NAME {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let (file_count, total_bytes) = WalkDir::new(&path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .fold((0usize, 0u64), |(count, bytes), e| {
                let len = e.metadata().map(|m| m.len()).unwrap_or(0);
                (count + 1, bytes + len)
            });

        batches.push(BatchSummary {
            date: NaiveDate::parse_from_str(&name, BATCH_DATE_FORMAT).ok(),
            name,
            path,
            file_count,
            total_bytes,
        });
    }

    batches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_destination_free_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            unique_destination(dir.path(), OsStr::new("a.txt")),
            dir.path().join("a.txt")
        );
    }

    #[test]
    fn test_unique_destination_counts_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), "1").unwrap();
        std::fs::write(dir.path().join("report (1).pdf"), "2").unwrap();

        assert_eq!(
            unique_destination(dir.path(), OsStr::new("report.pdf")),
            dir.path().join("report (2).pdf")
        );
    }

    #[test]
    fn test_unique_destination_without_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".bashrc"), "").unwrap();
        std::fs::write(dir.path().join("Makefile"), "").unwrap();

        assert_eq!(
            unique_destination(dir.path(), OsStr::new(".bashrc")),
            dir.path().join(".bashrc (1)")
        );
        assert_eq!(
            unique_destination(dir.path(), OsStr::new("Makefile")),
            dir.path().join("Makefile (1)")
        );
    }

    #[test]
    fn test_move_file_keeps_content() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, "payload").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "payload");
    }

    #[test]
    fn test_move_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = move_file(&dir.path().join("ghost"), &dir.path().join("x")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    fn mtime_secs(path: &Path) -> u64 {
        std::fs::metadata(path)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_copy_never_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, "new").unwrap();
        std::fs::write(&to, "already here").unwrap();

        let err = copy_then_remove(&from, &to, |p| std::fs::remove_file(p)).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&from).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "already here");
    }

    #[test]
    fn test_copy_removes_source_and_keeps_mtime() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, "payload").unwrap();
        let old = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        File::options().write(true).open(&from).unwrap().set_modified(old).unwrap();

        copy_then_remove(&from, &to, |p| std::fs::remove_file(p)).unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "payload");
        assert_eq!(mtime_secs(&to), 1_700_000_000);
    }

    #[test]
    fn test_copy_rolled_back_when_source_stays() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, "payload").unwrap();

        let err = copy_then_remove(&from, &to, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"))
        })
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(err.to_string().contains("could not remove original"));
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn test_summary_mentions_failures() {
        let mut report = StageReport::new(PathBuf::from("/s/2024-12-11"));
        assert_eq!(report.summary(), "0 file(s) moved to '/s/2024-12-11'.");

        report.errors.push(EntryFailure::new("/w/locked.bin", "in use"));
        assert!(report.summary().contains("1 file(s) could not be moved"));
    }
}
