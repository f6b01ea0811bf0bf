use serde::Deserialize;

/// Discord API error body.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: String,
    /// Seconds to wait, present on 429 responses.
    #[serde(default)]
    pub retry_after: Option<f64>,
}

impl ErrorResponse {
    /// Retry delay in milliseconds, rounded up. Falls back to five seconds
    /// when the body carries no usable value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn retry_after_ms(&self) -> u64 {
        match self.retry_after {
            Some(seconds) if seconds.is_finite() && seconds >= 0.0 => (seconds * 1000.0).ceil() as u64,
            _ => 5000,
        }
    }
}
