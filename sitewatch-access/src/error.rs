use thiserror::Error;

/// Errors raised while parsing read-API query parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("invalid status filter {0:?}; expected up or down")]
    InvalidStatus(String),
    #[error("invalid label filter {0:?}; expected key:value")]
    InvalidLabel(String),
}
