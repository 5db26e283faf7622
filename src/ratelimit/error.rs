use std::path::PathBuf;
use thiserror::Error;

/// Errors returned to callers waiting for rate limit clearance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Every queue slot is taken; the caller decides whether to retry
    #[error("rate limit queue for {service} is full ({capacity} pending requests)")]
    QueueFull {
        /// Service whose queue rejected the request
        service: String,
        /// Configured queue capacity
        capacity: usize,
    },

    /// The wait context was cancelled
    #[error("wait for rate limit clearance was cancelled")]
    Cancelled,

    /// The wait context's deadline passed before admission
    #[error("deadline exceeded while waiting for rate limit clearance")]
    DeadlineExceeded,

    /// The limiter shut down while the request was pending
    #[error("rate limiter for {service} stopped")]
    Stopped {
        /// Service whose limiter stopped
        service: String,
    },
}

impl RateLimitError {
    /// Returns true when the error came from the caller's own context
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Errors raised while loading service profile overrides
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read rate limit config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rate limit config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid rate limit profile for {service}: {reason}")]
    InvalidProfile { service: String, reason: String },
}
