use thiserror::Error;

/// Failure of a single feed or segment call. Never fatal to a sync run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("feed not found: {0}")]
    NotFound(String),

    #[error("failed to read {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response for {locator}: {message}")]
    Parse { locator: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
