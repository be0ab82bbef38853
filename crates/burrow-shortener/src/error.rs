use burrow_core::{CoreError, StorageError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("batch of {size} items exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
    #[error("storage backend cannot apply a batch atomically")]
    AtomicBatchUnsupported,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
        }
    }
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::Conflict(key) => Self::Conflict(key),
            other => Self::Storage(other),
        }
    }
}
