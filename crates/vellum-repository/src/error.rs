use std::fmt;

use vellum_ledger::LedgerError;
use vellum_persistence::PersistenceError;
use vellum_store::StoreError;
use vellum_types::Address;

/// Coarse error classification used at the outer boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    BadQuery,
    NotFound,
    Conflict,
    AddressMismatch,
    DanglingReference,
    Store,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidInput => "invalid input",
            Self::BadQuery => "bad query",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::AddressMismatch => "address mismatch",
            Self::DanglingReference => "dangling reference",
            Self::Store => "store error",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("bad query: {0}")]
    BadQuery(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("address mismatch: expected {expected}, computed {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("ledger references missing content {0}")]
    DanglingReference(Address),

    #[error("blob store: {context}: {source}")]
    Blob {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("metadata store: {context}: {source}")]
    Metadata {
        context: &'static str,
        #[source]
        source: PersistenceError,
    },

    #[error("reading content: {0}")]
    Read(#[source] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    /// Classify for boundary mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::BadQuery(_) => ErrorKind::BadQuery,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::AddressMismatch { .. } => ErrorKind::AddressMismatch,
            Self::DanglingReference(_) => ErrorKind::DanglingReference,
            Self::Blob { .. } | Self::Metadata { .. } | Self::Read(_) => ErrorKind::Store,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Wrap a blob store failure, keeping `NotFound` and bad paths typed.
    pub(crate) fn blob(context: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => Self::NotFound(format!("content {path}")),
            StoreError::InvalidPath(path) => Self::InvalidInput(format!("blob path {path:?}")),
            source => Self::Blob { context, source },
        }
    }

    /// Wrap a metadata store failure, keeping `NotFound` and `Conflict` typed.
    pub(crate) fn metadata(context: &'static str, err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => Self::NotFound(what),
            PersistenceError::Conflict(what) => Self::Conflict(what),
            source => Self::Metadata { context, source },
        }
    }
}

impl From<LedgerError> for RepositoryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::BadQuery(msg) => Self::BadQuery(msg),
            LedgerError::AddressMismatch { expected, actual } => {
                Self::AddressMismatch { expected, actual }
            }
            LedgerError::Read(io) => Self::Read(io),
            other @ (LedgerError::InvalidInput(_)
            | LedgerError::SizeMismatch { .. }
            | LedgerError::BodyConsumed) => Self::InvalidInput(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
