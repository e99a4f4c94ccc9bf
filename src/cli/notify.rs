use colored::*;

use crate::cleaner::notify::{LogNotifier, Notifier, PURGE_FAILED_TITLE};

/// Prints each phase summary as a titled block on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        LogNotifier.notify(title, message);

        let icon = if title == PURGE_FAILED_TITLE {
            "✗".red()
        } else {
            "✓".green()
        };
        println!();
        println!("  {} {}", icon, title.bold());
        for line in message.lines() {
            println!("    {}", line);
        }
    }
}
