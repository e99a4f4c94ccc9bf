//! Typed errors for stalesweep operations.
//! The binary uses `anyhow` at the top level; each phase reports its own
//! failure so the scheduler can decide what is fatal.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::cleaner::purger::PurgeReport;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has the wrong shape
    #[error("Failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Config parsed but breaks an invariant
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Config could not be written back
    #[error("Failed to write config '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Errors that mean "the record on disk is unusable", as opposed to
    /// I/O trouble reaching it. These send the user back through setup.
    pub fn is_invalid_record(&self) -> bool {
        matches!(self, ConfigError::Parse { .. } | ConfigError::Invalid(_))
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Setup I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setup produced an unusable config: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum StageError {
    /// The watched directory itself cannot be listed
    #[error("Cannot read watched directory '{}': {source}", path.display())]
    ReadWatched {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrashError {
    /// The path disappeared before the trash facility got to it
    #[error("'{}' no longer exists", path.display())]
    Missing { path: PathBuf },

    /// The facility refused this one entry
    #[error("Failed to trash '{}': {reason}", path.display())]
    Failed { path: PathBuf, reason: String },

    /// The facility as a whole cannot be used
    #[error("Trash facility unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Debug, Error)]
pub enum PurgeError {
    /// The facility could not be used. `partial` holds whatever was
    /// already trashed before it went away (empty when checked up front).
    #[error("Trash facility unavailable: {reason}")]
    Unavailable {
        reason: String,
        partial: PurgeReport,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open run lock '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Failed to create staging root '{}': {source}", path.display())]
    StagingRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single entry that failed during staging or purging.
/// Recorded and counted; never aborts the phase.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl EntryFailure {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
