use vellum_types::Address;

/// Errors raised while building or reading model values.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A required field is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A query filter is malformed.
    #[error("bad query: {0}")]
    BadQuery(String),

    /// The supplied address does not match the payload.
    #[error("address mismatch: expected {expected}, computed {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    /// The body produced a different number of bytes than declared.
    #[error("size mismatch: declared {declared} bytes, read {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    /// The body has already been taken.
    #[error("content body already consumed")]
    BodyConsumed,

    /// Reading the body failed.
    #[error("content read failed: {0}")]
    Read(#[from] std::io::Error),
}

impl From<vellum_types::TypeError> for LedgerError {
    fn from(err: vellum_types::TypeError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result alias for model operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
