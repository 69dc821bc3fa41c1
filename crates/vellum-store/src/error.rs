/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested path does not exist.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The path is empty or escapes the store root.
    #[error("invalid blob path: {0:?}")]
    InvalidPath(String),

    /// A configuration option was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error from the local filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from a remote object store.
    #[error("object store error: {0}")]
    Remote(#[source] object_store::Error),
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Map an I/O error on `path`, folding `ErrorKind::NotFound` into
    /// [`StoreError::NotFound`].
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io(err)
        }
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::Remote(other),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
