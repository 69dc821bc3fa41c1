/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// No revision matched.
    #[error("not found: {0}")]
    NotFound(String),

    /// A revision with the same `(resource_id, created_on)` already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// `run` was called while the store was already running.
    #[error("metadata store is already running")]
    AlreadyRunning,

    /// `run` was called after the store was stopped.
    #[error("metadata store is stopped")]
    Stopped,

    /// A configuration option was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A revision could not be converted to or from a table row.
    #[error("row conversion failed: {0}")]
    Row(String),

    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PersistenceError {
    /// Returns `true` for [`PersistenceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for [`PersistenceError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result alias for metadata store operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
