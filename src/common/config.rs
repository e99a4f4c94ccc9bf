use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::errors::{ConfigError, SetupError};
use super::lock::LOCK_FILE_NAME;
use super::paths;

/// Default purge cadence: weekly
pub const DEFAULT_PURGE_INTERVAL_DAYS: u32 = 7;

/// Longest accepted purge interval, roughly a century
pub const MAX_PURGE_INTERVAL_DAYS: u32 = 36_500;

/// Name of the staging folder created inside the watched directory by default
pub const DEFAULT_STAGING_DIR_NAME: &str = "To Be Deleted";

/// Name of the exempt folder created inside the watched directory by default
pub const DEFAULT_EXEMPT_DIR_NAME: &str = "Files to Back Up";

/// The configuration record exactly as it sits on disk.
///
/// Kept loose on purpose so a hand-edited file with a bad value still
/// parses and can be reported precisely by [`Config::from_raw`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub watched_directory: PathBuf,

    pub staging_root: PathBuf,

    #[serde(default)]
    pub exempt_paths: Vec<PathBuf>,

    #[serde(default = "default_interval_days")]
    pub purge_interval_days: i64,

    /// ISO-8601 timestamp; absent or empty means "never purged"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_purge_timestamp: Option<String>,
}

fn default_interval_days() -> i64 {
    DEFAULT_PURGE_INTERVAL_DAYS as i64
}

/// Validated retention configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Folder whose stale files get staged
    pub watched_dir: PathBuf,

    /// Root holding the date-keyed batches
    pub staging_root: PathBuf,

    /// Paths never staged or purged (whole-path match)
    pub exempt_paths: Vec<PathBuf>,

    /// Days between purges, at least 1
    pub purge_interval_days: u32,

    /// When the staging root was last purged
    pub last_purge: Option<DateTime<Local>>,
}

impl Config {
    /// Build and validate a config with no purge history
    pub fn new(
        watched_dir: impl Into<PathBuf>,
        staging_root: impl Into<PathBuf>,
        exempt_paths: Vec<PathBuf>,
        purge_interval_days: i64,
    ) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig {
            watched_directory: watched_dir.into(),
            staging_root: staging_root.into(),
            exempt_paths,
            purge_interval_days,
            last_purge_timestamp: None,
        })
    }

    /// Layout used when nobody configured anything: the user's download
    /// folder with the staging and exempt folders inside it.
    pub fn default_for_user() -> Self {
        let watched_dir = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("/tmp/Downloads"));
        Self::default_for(watched_dir)
    }

    /// Default staging and exempt folders nested inside `watched_dir`
    pub fn default_for(watched_dir: impl Into<PathBuf>) -> Self {
        let watched_dir = watched_dir.into();
        Self {
            staging_root: watched_dir.join(DEFAULT_STAGING_DIR_NAME),
            exempt_paths: vec![watched_dir.join(DEFAULT_EXEMPT_DIR_NAME)],
            watched_dir,
            purge_interval_days: DEFAULT_PURGE_INTERVAL_DAYS,
            last_purge: None,
        }
    }

    /// Convert the on-disk record, expanding `~` and checking every invariant
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let purge_interval_days = u32::try_from(raw.purge_interval_days)
            .ok()
            .filter(|days| *days >= 1)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "purge_interval_days must be a positive number of days, got {}",
                    raw.purge_interval_days
                ))
            })?;

        let last_purge = match raw.last_purge_timestamp.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => None,
        };

        let config = Self {
            watched_dir: paths::expand_tilde(&raw.watched_directory),
            staging_root: paths::expand_tilde(&raw.staging_root),
            exempt_paths: raw
                .exempt_paths
                .iter()
                .map(|p| paths::expand_tilde(p))
                .collect(),
            purge_interval_days,
            last_purge,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_raw(&self) -> RawConfig {
        RawConfig {
            watched_directory: self.watched_dir.clone(),
            staging_root: self.staging_root.clone(),
            exempt_paths: self.exempt_paths.clone(),
            purge_interval_days: self.purge_interval_days as i64,
            last_purge_timestamp: self.last_purge.map(format_timestamp),
        }
    }

    /// Check the config invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.purge_interval_days == 0 {
            return Err(ConfigError::Invalid(
                "purge_interval_days must be at least 1".into(),
            ));
        }
        if self.purge_interval_days > MAX_PURGE_INTERVAL_DAYS {
            return Err(ConfigError::Invalid(format!(
                "purge_interval_days must be at most {}, got {}",
                MAX_PURGE_INTERVAL_DAYS, self.purge_interval_days
            )));
        }
        if self.exempt_paths.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one exempt path is required".into(),
            ));
        }

        let mut named: Vec<(&str, &Path)> = vec![
            ("watched_directory", self.watched_dir.as_path()),
            ("staging_root", self.staging_root.as_path()),
        ];
        named.extend(self.exempt_paths.iter().map(|p| ("exempt_paths", p.as_path())));

        for (name, path) in &named {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
            if !path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be an absolute path, got '{}'",
                    name,
                    path.display()
                )));
            }
        }

        if paths::is_within(&self.watched_dir, &self.staging_root) {
            return Err(ConfigError::Invalid(format!(
                "watched_directory '{}' must not be inside staging_root '{}'",
                self.watched_dir.display(),
                self.staging_root.display()
            )));
        }

        for (i, (name_a, a)) in named.iter().enumerate() {
            for (name_b, b) in &named[i + 1..] {
                if paths::same_path(a, b) {
                    return Err(ConfigError::Invalid(format!(
                        "{} and {} both point at '{}'",
                        name_a,
                        name_b,
                        a.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check if a path is one of the exempt paths
    pub fn is_exempt(&self, path: &Path) -> bool {
        self.exempt_paths.iter().any(|p| paths::same_path(p, path))
    }

    /// Check if a path is the staging root
    pub fn is_staging_root(&self, path: &Path) -> bool {
        paths::same_path(&self.staging_root, path)
    }

    /// Subtrees of the staging root a purge must never enter: exempt paths
    /// and the watched directory itself
    pub fn is_purge_barrier(&self, path: &Path) -> bool {
        self.is_exempt(path) || paths::same_path(&self.watched_dir, path)
    }

    /// Location of the run lock
    pub fn lock_path(&self) -> PathBuf {
        self.staging_root.join(LOCK_FILE_NAME)
    }
}

/// Parse an ISO-8601 timestamp. Accepts RFC 3339 with an offset, or a
/// naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as local time. Empty means none.
pub fn parse_timestamp(raw: &str) -> Result<Option<DateTime<Local>>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Local)));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        if let Some(local) = Local.from_local_datetime(&naive).earliest() {
            return Ok(Some(local));
        }
    }

    Err(ConfigError::Invalid(format!(
        "last_purge_timestamp '{}' is not an ISO-8601 timestamp",
        raw
    )))
}

pub fn format_timestamp(ts: DateTime<Local>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Get the stalesweep data directory (~/.stalesweep)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".stalesweep")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Owns the configuration file on disk
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: paths::expand_tilde(&path.into()),
        }
    }

    pub fn at_default_location() -> Self {
        Self::new(default_config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory for rotated run logs, next to the config file
    pub fn logs_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| data_dir().join("logs"))
    }

    /// Read the record without validating it. `None` if the file is absent.
    pub fn load_raw(&self) -> Result<Option<RawConfig>, ConfigError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let raw = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(raw))
    }

    /// Load and validate. `None` if no config has been written yet.
    pub fn load(&self) -> Result<Option<Config>, ConfigError> {
        match self.load_raw()? {
            Some(raw) => Config::from_raw(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Write the config, replacing the previous file atomically
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.save_raw(&config.to_raw())
    }

    pub fn save_raw(&self, raw: &RawConfig) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = toml::to_string_pretty(raw)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

/// Why setup is being requested
#[derive(Debug, Clone, PartialEq)]
pub enum SetupReason {
    /// No config file yet
    Missing,
    /// The config file exists but cannot be used
    Invalid(String),
}

/// Produces a complete config when none is usable.
///
/// `Ok(None)` means the user cancelled; the run then ends with nothing
/// written.
pub trait SetupProvider {
    fn request_config(&self, reason: &SetupReason) -> Result<Option<Config>, SetupError>;
}
