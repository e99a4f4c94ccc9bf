//! # stalesweep
//!
//! Unattended two-stage cleanup for folders that only ever grow, such as
//! a downloads folder.
//!
//! - **Staging**: files untouched for more than 24 hours are moved into a
//!   dated batch (`To Be Deleted/2024-12-11/`) under the staging root
//! - **Purging**: once the purge interval has elapsed, everything staged is
//!   sent to the system trash, so it stays recoverable
//! - **Exempt paths**: named paths are never staged or purged
//! - **Cron-friendly**: one run per invocation, guarded by a lock file, with
//!   the last purge recorded in a plain TOML config

pub mod cli;
pub mod cleaner;
pub mod common;
