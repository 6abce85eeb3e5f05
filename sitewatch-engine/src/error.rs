use std::time::Duration;

use sitewatch_core::ConfigError;
use sitewatch_protocol::SignatureError;
use thiserror::Error;

/// Failures raised while validating or scraping a single source.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("no scraper registered for source type {0:?}")]
    UnknownKind(String),
    #[error("invalid configuration for source {source_name}: {message}")]
    InvalidConfig {
        source_name: String,
        message: String,
    },
    #[error("source {source_name} is not a {expected} source")]
    KindMismatch {
        source_name: String,
        expected: &'static str,
    },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request signing failed: {0}")]
    Signing(#[from] SignatureError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ScrapeError {
    pub fn invalid(source_name: &str, message: impl Into<String>) -> Self {
        ScrapeError::InvalidConfig {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ScrapeError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ScrapeError::Status(status.as_u16())
        } else {
            ScrapeError::Transport(err.to_string())
        }
    }
}

/// Errors that may occur when building or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error("site not found: {0}")]
    SiteNotFound(String),
    #[error("site {0} is disabled")]
    SiteDisabled(String),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}
