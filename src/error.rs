//! Error types for Meterguard.

use thiserror::Error;

use crate::ratelimit::RateLimited;

/// Main error type for Meterguard operations.
#[derive(Error, Debug)]
pub enum MeterguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream call was refused by admission control
    #[error("{0}")]
    RateLimited(RateLimited),

    /// The limiter actor has shut down
    #[error("Rate limiter is no longer running")]
    LimiterUnavailable,

    /// Malformed caller input (e.g. a replay trace line)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeterguardError {
    /// Returns the denial if this error is a rate limit rejection.
    pub fn as_rate_limited(&self) -> Option<&RateLimited> {
        match self {
            MeterguardError::RateLimited(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for MeterguardError {
    fn from(err: config::ConfigError) -> Self {
        MeterguardError::Config(err.to_string())
    }
}

/// Result type alias for Meterguard operations.
pub type Result<T> = std::result::Result<T, MeterguardError>;
