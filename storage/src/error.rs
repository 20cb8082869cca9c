//! Storage error types.
//!
//! Returned by every [`crate::OffsetStore`] implementation. The poller treats all of them as
//! retryable: the in-memory offset is kept and the commit is attempted again.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Corrupt offset: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Io(format!("storage task failed: {e}"))
    }
}

impl From<StorageError> for rbot_core::RbotError {
    fn from(e: StorageError) -> Self {
        rbot_core::RbotError::Persistence(e.to_string())
    }
}
