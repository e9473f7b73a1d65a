pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod format;
pub mod log_entry;
pub mod logging;
pub mod planner;
pub mod registry;
pub mod stream;
pub mod timespec;
