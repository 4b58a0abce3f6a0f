pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod poll;
pub mod screen;
pub mod stats;
