use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("invalid content address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
