//! Error types for per-source fetching.

use thiserror::Error;

/// HTTP statuses worth retrying a source fetch for.
pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Why a single source could not be fetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection, DNS or protocol failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be read.
    #[error("failed to read body: {0}")]
    Body(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => RETRYABLE_STATUSES.contains(code),
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Body(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
