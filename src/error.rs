use std::io;

use thiserror::Error;

use crate::metrics::Category;

/// Error kinds surfaced by the polling engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration. Fatal; reported before any loop starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single metric category failed to collect. Recovered locally:
    /// the category renders as unavailable for that tick.
    #[error("collection failed for {category}: {message}")]
    Collection { category: Category, message: String },

    /// Terminal write failure, escalated after the retry budget is spent.
    #[error("render error: {0}")]
    Render(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn collection<S: Into<String>>(category: Category, msg: S) -> Self {
        Error::Collection {
            category,
            message: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
