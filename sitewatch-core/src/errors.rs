use std::io;

use thiserror::Error;

/// Result type used across the SiteWatch core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Canonical error representation shared by all crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable {key}: {source}")]
    InvalidEnvVar {
        key: &'static str,
        #[source]
        source: std::env::VarError,
    },

    #[error("failed to read configuration from {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration from {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid location {name}: {reason}")]
    InvalidLocation { name: String, reason: String },

    #[error("invalid server settings: {0}")]
    InvalidServerSettings(String),

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for CoreError {
    fn from(value: ConfigError) -> Self {
        CoreError::Config(value.to_string())
    }
}
