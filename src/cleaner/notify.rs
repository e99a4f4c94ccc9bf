/// Title sent after every staging pass
pub const STAGE_TITLE: &str = "Daily Cleanup Complete";

/// Title sent after a purge
pub const PURGE_TITLE: &str = "Weekly Cleanup Complete";

/// Title sent when the purge phase could not run
pub const PURGE_FAILED_TITLE: &str = "Weekly Cleanup Failed";

/// Receives a short human-readable message after each phase.
/// Fire-and-forget: delivery problems are the sink's business.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// Sink that only logs. Used when nobody is watching the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(title, "{}", message);
    }
}
