pub mod args;
pub mod notify;
pub mod output;
pub mod setup;
