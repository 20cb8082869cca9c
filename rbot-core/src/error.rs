use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RbotError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Bot error: {0}")]
    Bot(String),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Failure while talking to the update endpoint. Always retried by the poller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("API returned status {0}")]
    Api(String),
}

impl TransportError {
    /// Minimum delay the server asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, RbotError>;
