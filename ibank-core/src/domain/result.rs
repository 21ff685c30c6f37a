//! Result and error types for the core library

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Bank is unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The bank refuses requests until `retry_after` has passed
    #[error("Rate limited by bank: {message}")]
    RateLimited { message: String, retry_after: Duration },

    #[error("Statement {period}/{year} not found")]
    StatementNotFound { year: i32, period: u32 },

    #[error("Failed to save sync checkpoint: {0}")]
    CheckpointWriteFailed(String),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("Unexpected response from bank: {0}")]
    InvalidResponse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Create an upstream (transient) error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Only transient bank failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::RateLimited { .. })
    }

    /// Shortest wait before the bank will answer again, if it says so
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
