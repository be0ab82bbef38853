use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised while building or decoding short codes.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Coarse classification of a [`StorageError`].
///
/// Callers branch on the kind, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A lookup found nothing.
    NotFound,
    /// A write collided with an existing short code or unique value.
    Conflict,
    /// Disk or network failure; the operation may succeed if the caller retries.
    Transient,
    /// Startup-time failure; the process must not start serving.
    Fatal,
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("transaction is no longer active")]
    TransactionClosed,
    #[error("storage is closed")]
    Closed,
    #[error("invalid storage configuration: {0}")]
    Configuration(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::Configuration(_) | StorageError::Migration(_) => ErrorKind::Fatal,
            StorageError::Io(_)
            | StorageError::Unavailable(_)
            | StorageError::Timeout(_)
            | StorageError::Query(_)
            | StorageError::InvalidData(_)
            | StorageError::TransactionClosed
            | StorageError::Closed => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
