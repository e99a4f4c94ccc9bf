use chrono::{DateTime, Duration, Local};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

use stalesweep::cleaner::classifier::batch_name;
use stalesweep::cleaner::notify::{Notifier, PURGE_FAILED_TITLE, PURGE_TITLE, STAGE_TITLE};
use stalesweep::cleaner::purger::purge_entries;
use stalesweep::cleaner::trash::TrashFacility;
use stalesweep::cleaner::{PurgePhase, RunMode, RunOptions, RunOutcome, Scheduler};
use stalesweep::common::config::{Config, ConfigStore, SetupProvider, SetupReason};
use stalesweep::common::errors::{SetupError, TrashError};
use stalesweep::common::lock::RunLock;

// ─── Test doubles ────────────────────────────────────────────────────────────

/// Moves "trashed" files into a private bin so they stay inspectable
struct BinTrash {
    bin: PathBuf,
    trashed: RefCell<Vec<PathBuf>>,
    refuse: Vec<String>,
    unavailable: bool,
    /// Goes away after this many successful moves
    fail_after: Option<usize>,
}

impl BinTrash {
    fn new(bin: PathBuf) -> Self {
        std::fs::create_dir_all(&bin).unwrap();
        Self {
            bin,
            trashed: RefCell::new(Vec::new()),
            refuse: Vec::new(),
            unavailable: false,
            fail_after: None,
        }
    }
}

impl TrashFacility for BinTrash {
    fn ensure_available(&self) -> Result<(), TrashError> {
        if self.unavailable {
            return Err(TrashError::Unavailable {
                reason: "no trash here".into(),
            });
        }
        Ok(())
    }

    fn send_to_trash(&self, path: &Path) -> Result<(), TrashError> {
        if self.fail_after == Some(self.trashed.borrow().len()) {
            return Err(TrashError::Unavailable {
                reason: "trash volume unmounted".into(),
            });
        }
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if self.refuse.contains(&name) {
            return Err(TrashError::Failed {
                path: path.to_path_buf(),
                reason: "file is locked".into(),
            });
        }
        let dest = self.bin.join(format!("{}-{}", self.trashed.borrow().len(), name));
        std::fs::rename(path, dest).map_err(|e| TrashError::Failed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.trashed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: RefCell<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.messages
            .borrow_mut()
            .push((title.to_string(), message.to_string()));
    }
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.messages.borrow().iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Answers setup with a fixed config (or cancels) and counts calls
struct FixedSetup {
    config: Option<Config>,
    calls: RefCell<Vec<SetupReason>>,
}

impl FixedSetup {
    fn cancelling() -> Self {
        Self {
            config: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn answering(config: Config) -> Self {
        Self {
            config: Some(config),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl SetupProvider for FixedSetup {
    fn request_config(&self, reason: &SetupReason) -> Result<Option<Config>, SetupError> {
        self.calls.borrow_mut().push(reason.clone());
        Ok(self.config.clone())
    }
}

// ─── Fixture ─────────────────────────────────────────────────────────────────

struct Fixture {
    _dir: TempDir,
    store: ConfigStore,
    config: Config,
    trash: BinTrash,
    notifier: RecordingNotifier,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::default_for(dir.path().join("Downloads"));
        std::fs::create_dir_all(&config.watched_dir).unwrap();
        std::fs::create_dir_all(&config.exempt_paths[0]).unwrap();
        let store = ConfigStore::new(dir.path().join("conf/config.toml"));
        let trash = BinTrash::new(dir.path().join("bin"));
        Self {
            _dir: dir,
            store,
            config,
            trash,
            notifier: RecordingNotifier::default(),
        }
    }

    fn save_config(&self, last_purge: Option<DateTime<Local>>, interval: u32) {
        let mut config = self.config.clone();
        config.last_purge = last_purge;
        config.purge_interval_days = interval;
        self.store.save(&config).unwrap();
    }

    fn stage_file(&self, batch: &str, name: &str) -> PathBuf {
        let dir = self.config.staging_root.join(batch);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, name).unwrap();
        path
    }

    fn scheduler<'a>(&'a self, setup: &'a dyn SetupProvider, mode: RunMode) -> Scheduler<'a> {
        Scheduler::new(&self.store, setup, &self.notifier, &self.trash).with_options(RunOptions {
            mode,
            show_progress: false,
        })
    }
}

fn write_aged(path: &Path, now: DateTime<Local>, hours_old: i64) {
    std::fs::write(path, "x").unwrap();
    let modified: SystemTime = (now - Duration::hours(hours_old)).into();
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn test_overdue_purge_trashes_everything_and_records_now() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(Some(now - Duration::days(8)), 7);
    fx.stage_file("2024-12-01", "a.txt");
    fx.stage_file("2024-12-01", "b.txt");
    fx.stage_file("2024-12-03", "c.txt");

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    let purge = report.purge_report().expect("purge should have run");
    assert_eq!(purge.purged, 3);
    assert_eq!(purge.missing, 0);
    assert_eq!(fx.trash.trashed.borrow().len(), 3);
    assert!(report.config_saved);

    let saved = fx.store.load().unwrap().unwrap();
    assert_eq!(saved.last_purge.map(|t| t.timestamp()), Some(now.timestamp()));
    assert!(setup.calls.borrow().is_empty());
    assert_eq!(fx.notifier.titles(), vec![STAGE_TITLE, PURGE_TITLE]);
}

#[test]
fn test_purge_not_due_right_after_purge() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(None, 7);
    fx.stage_file("2024-12-01", "a.txt");
    let setup = FixedSetup::cancelling();

    let first = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();
    assert!(first.purge_report().is_some());

    fx.stage_file("2024-12-02", "b.txt");
    let second = fx
        .scheduler(&setup, RunMode::Full)
        .run(now + Duration::minutes(1))
        .unwrap();

    assert!(matches!(second.purge, PurgePhase::NotDue { .. }));
    assert!(fx.config.staging_root.join("2024-12-02/b.txt").exists());
    assert!(!second.config_saved);
}

#[test]
fn test_full_run_stages_then_purges_the_same_files() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(None, 7);
    write_aged(&fx.config.watched_dir.join("a.txt"), now, 30);
    write_aged(&fx.config.watched_dir.join("b.txt"), now, 1);

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.stage.as_ref().unwrap().moved_count(), 1);
    assert_eq!(report.purge_report().unwrap().purged, 1);
    assert!(fx.config.watched_dir.join("b.txt").exists());
    assert!(fx.config.exempt_paths[0].exists());
    assert!(fx.config.staging_root.exists());
    assert!(!fx.config.staging_root.join(batch_name(now)).exists());
}

#[test]
fn test_stage_only_never_purges() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(None, 7);
    write_aged(&fx.config.watched_dir.join("a.txt"), now, 30);

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::StageOnly).run(now).unwrap();

    assert!(matches!(report.purge, PurgePhase::Skipped));
    assert!(fx.config.staging_root.join(batch_name(now)).join("a.txt").exists());
    assert!(fx.trash.trashed.borrow().is_empty());
    assert_eq!(fx.store.load().unwrap().unwrap().last_purge, None);
}

#[test]
fn test_force_purge_ignores_interval() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(Some(now - Duration::hours(1)), 30);
    fx.stage_file("2024-12-01", "a.txt");

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::ForcePurge).run(now).unwrap();

    assert_eq!(report.purge_report().unwrap().purged, 1);
}

#[test]
fn test_failed_entry_still_advances_timestamp() {
    let mut fx = Fixture::new();
    let now = Local::now();
    fx.save_config(None, 7);
    fx.stage_file("2024-12-01", "ok.txt");
    let stuck = fx.stage_file("2024-12-01", "stuck.txt");
    fx.trash.refuse = vec!["stuck.txt".into()];

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    let purge = report.purge_report().unwrap();
    assert_eq!(purge.purged, 1);
    assert_eq!(purge.errors.len(), 1);
    assert_eq!(purge.errors[0].path, stuck);
    assert!(stuck.exists(), "failed entry stays staged");
    assert!(fx.store.load().unwrap().unwrap().last_purge.is_some());
    assert!(!report.purge_failed());
}

#[test]
fn test_unavailable_trash_keeps_timestamp_and_files() {
    let mut fx = Fixture::new();
    let now = Local::now();
    let last = now - Duration::days(10);
    fx.save_config(Some(last), 7);
    let staged = fx.stage_file("2024-12-01", "a.txt");
    write_aged(&fx.config.watched_dir.join("old.txt"), now, 48);
    fx.trash.unavailable = true;

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert!(report.purge_failed());
    assert_eq!(report.stage.as_ref().unwrap().moved_count(), 1, "staging is unaffected");
    assert!(staged.exists());
    let saved = fx.store.load().unwrap().unwrap();
    assert_eq!(saved.last_purge.map(|t| t.timestamp()), Some(last.timestamp()));
}

#[test]
fn test_missing_config_and_cancelled_setup_writes_nothing() {
    let fx = Fixture::new();
    let setup = FixedSetup::cancelling();
    write_aged(&fx.config.watched_dir.join("a.txt"), Local::now(), 30);

    let report = fx.scheduler(&setup, RunMode::Full).run(Local::now()).unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(*setup.calls.borrow(), vec![SetupReason::Missing]);
    assert!(!fx.store.path().exists());
    assert!(!fx.config.staging_root.exists());
    assert!(fx.config.watched_dir.join("a.txt").exists());
    assert!(fx.notifier.titles().is_empty());
}

#[test]
fn test_setup_config_is_saved_and_used() {
    let fx = Fixture::new();
    let now = Local::now();
    let setup = FixedSetup::answering(fx.config.clone());

    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    let saved = fx.store.load().unwrap().unwrap();
    assert_eq!(saved.watched_dir, fx.config.watched_dir);
    assert!(saved.last_purge.is_some(), "first run purges immediately");
}

#[test]
fn test_invalid_config_goes_back_to_setup() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.store.path().parent().unwrap()).unwrap();
    std::fs::write(fx.store.path(), "purge_interval_days = 0\n").unwrap();
    let setup = FixedSetup::cancelling();

    let report = fx.scheduler(&setup, RunMode::Full).run(Local::now()).unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(matches!(setup.calls.borrow()[0], SetupReason::Invalid(_)));
    assert_eq!(
        std::fs::read_to_string(fx.store.path()).unwrap(),
        "purge_interval_days = 0\n",
        "cancelled setup must not rewrite the file"
    );
}

#[test]
fn test_held_lock_skips_the_run() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(None, 7);
    write_aged(&fx.config.watched_dir.join("a.txt"), now, 30);
    std::fs::create_dir_all(&fx.config.staging_root).unwrap();
    let _held = RunLock::try_acquire(&fx.config.lock_path()).unwrap().unwrap();

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.outcome, RunOutcome::Locked);
    assert!(fx.config.watched_dir.join("a.txt").exists());
    assert_eq!(fx.store.load().unwrap().unwrap().last_purge, None);
}

#[test]
fn test_lock_file_survives_purge() {
    let fx = Fixture::new();
    fx.save_config(None, 7);
    fx.stage_file("2024-12-01", "a.txt");

    let setup = FixedSetup::cancelling();
    fx.scheduler(&setup, RunMode::Full).run(Local::now()).unwrap();

    assert!(fx.config.lock_path().exists());
    assert_eq!(fx.trash.trashed.borrow().len(), 1);
}

#[test]
fn test_exempt_path_inside_staging_root_is_not_purged() {
    let fx = Fixture::new();
    let mut config = fx.config.clone();
    let pinned = config.staging_root.join("pinned");
    config.exempt_paths.push(pinned.clone());
    fx.store.save(&config).unwrap();
    std::fs::create_dir_all(&pinned).unwrap();
    std::fs::write(pinned.join("keep.txt"), "k").unwrap();
    fx.stage_file("2024-12-01", "a.txt");

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(Local::now()).unwrap();

    assert_eq!(report.purge_report().unwrap().purged, 1);
    assert!(pinned.join("keep.txt").exists());
}

#[test]
fn test_race_deleted_entries_count_as_missing() {
    let fx = Fixture::new();
    let present: Vec<PathBuf> = (0..3)
        .map(|i| fx.stage_file("2024-12-01", &format!("p{}.txt", i)))
        .collect();
    let gone: Vec<PathBuf> = (0..2)
        .map(|i| fx.stage_file("2024-12-01", &format!("g{}.txt", i)))
        .collect();

    let mut entries = present.clone();
    entries.extend(gone.iter().cloned());
    for path in &gone {
        std::fs::remove_file(path).unwrap();
    }

    let report = purge_entries(&entries, &fx.trash).unwrap();

    assert_eq!(report.purged, 3);
    assert_eq!(report.missing, 2);
    assert!(report.errors.is_empty());
}

#[test]
fn test_trash_lost_midway_reports_what_was_trashed() {
    let mut fx = Fixture::new();
    let now = Local::now();
    let last = now - Duration::days(10);
    fx.save_config(Some(last), 7);
    let first = fx.stage_file("2024-12-01", "a.txt");
    let second = fx.stage_file("2024-12-01", "b.txt");
    fx.trash.fail_after = Some(1);

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert!(report.purge_failed());
    match &report.purge {
        PurgePhase::Failed { partial, .. } => assert_eq!(partial.purged, 1),
        other => panic!("unexpected purge phase: {:?}", other),
    }
    assert!(!first.exists());
    assert!(second.exists(), "untouched entry stays staged");

    let messages = fx.notifier.messages.borrow();
    let (title, message) = messages.last().unwrap();
    assert_eq!(title, PURGE_FAILED_TITLE);
    assert!(message.contains("1 file(s) sent to the trash"));
    assert!(!message.contains("left in place"));

    // Still due, so the next run finishes the sweep
    let saved = fx.store.load().unwrap().unwrap();
    assert_eq!(saved.last_purge.map(|t| t.timestamp()), Some(last.timestamp()));
}

#[test]
fn test_oversized_interval_goes_back_to_setup() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(Some(now - Duration::hours(1)), 100_000_000);
    let setup = FixedSetup::cancelling();

    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(matches!(setup.calls.borrow()[0], SetupReason::Invalid(_)));
}

#[test]
fn test_largest_interval_is_simply_not_due() {
    let fx = Fixture::new();
    let now = Local::now();
    fx.save_config(Some(now - Duration::hours(1)), 36_500);
    let setup = FixedSetup::cancelling();

    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert!(matches!(report.purge, PurgePhase::NotDue { next_due: Some(_) }));
}

#[test]
fn test_watched_dir_inside_staging_root_is_refused() {
    let fx = Fixture::new();
    let now = Local::now();
    let mut config = fx.config.clone();
    config.watched_dir = config.staging_root.join("inbox");
    std::fs::create_dir_all(&config.watched_dir).unwrap();
    let fresh = config.watched_dir.join("fresh.txt");
    write_aged(&fresh, now, 0);
    fx.store.save(&config).unwrap();

    let setup = FixedSetup::cancelling();
    let report = fx.scheduler(&setup, RunMode::Full).run(now).unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(matches!(setup.calls.borrow()[0], SetupReason::Invalid(_)));
    assert!(fresh.exists());
    assert!(fx.trash.trashed.borrow().is_empty());
}
