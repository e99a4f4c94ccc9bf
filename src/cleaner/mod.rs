pub mod classifier;
pub mod notify;
pub mod purger;
pub mod scheduler;
pub mod staging;
pub mod trash;

pub use classifier::{is_purge_due, is_staging_eligible, WatchedEntry};
pub use notify::{LogNotifier, Notifier};
pub use purger::{purge, purge_entries, PurgeReport};
pub use scheduler::{PurgePhase, RunMode, RunOptions, RunOutcome, RunReport, Scheduler};
pub use staging::{list_batches, stage, BatchSummary, StageReport, StagedFile};
pub use trash::{SystemTrash, TrashFacility};
