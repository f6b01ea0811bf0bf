//! REST API error types.

use thiserror::Error;

/// REST call error variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum RestError {
    #[error("token rejected by Discord: {message}")]
    Unauthorized { message: String },

    #[error("resource not found: {path}")]
    NotFound { path: String },

    #[error("rate limited by Discord, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("failed to decode response: {message}")]
    Decode { message: String },

    #[error("unexpected REST error: {message}")]
    Unexpected { message: String },
}

impl RestError {
    /// Creates unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates unexpected error.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Returns whether retrying the same call later may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::RateLimited { .. })
    }
}
