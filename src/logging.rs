use tracing::Level;

use crate::error::{Error, Result};

/// Log verbosity resolved from the CLI's two mutually-exclusive flags.
/// Warnings only unless asked otherwise, matching the tool's quiet default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_flags(debug: bool, info: bool) -> Self {
        if debug {
            LogLevel::Debug
        } else if info {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    fn as_tracing(self) -> Level {
        match self {
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
        }
    }
}

/// Install the global subscriber once at process start. Events go to stderr
/// so they never corrupt the in-place display on stdout.
pub fn init(level: LogLevel) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(false)
        .with_max_level(level.as_tracing())
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::config(format!("failed to set tracing subscriber: {e}")))
}
