//! Discord authentication token value object.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bot authentication token with validation and masking.
///
/// The secret is wiped from memory when the last copy is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuthToken {
    value: String,
}

impl AuthToken {
    const MIN_TOKEN_LENGTH: usize = 50;

    /// Creates new token with format validation.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let value = value.trim();

        if value.len() < Self::MIN_TOKEN_LENGTH {
            return None;
        }

        if value.split('.').count() != 3 {
            return None;
        }

        Some(Self {
            value: value.to_string(),
        })
    }

    /// Creates token without validation.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Returns token as string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns the value of the `Authorization` header for REST calls.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bot {}", self.value)
    }

    /// Returns masked token for display.
    #[must_use]
    pub fn masked(&self) -> String {
        if self.value.len() <= 10 {
            return "*".repeat(self.value.len());
        }

        let visible_prefix = &self.value[..4];
        let visible_suffix = &self.value[self.value.len() - 4..];
        format!("{visible_prefix}...{visible_suffix}")
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &self.masked())
            .finish()
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_token() -> String {
        "MTIzNDU2Nzg5MDEyMzQ1Njc4OQ.XXXXXX.YYYYYYYYYYYYYYYYYYYYYYYYYYYY".to_string()
    }

    #[test]
    fn test_valid_token_creation() {
        let token = AuthToken::new(format!("  {}\n", make_valid_token()));
        assert_eq!(token.unwrap().as_str(), make_valid_token());
    }

    #[test]
    fn test_invalid_token_too_short() {
        assert!(AuthToken::new("short").is_none());
    }

    #[test]
    fn test_invalid_token_wrong_format() {
        assert!(AuthToken::new("a".repeat(60)).is_none());
    }

    #[test]
    fn test_authorization_header() {
        let token = AuthToken::new_unchecked("abc");
        assert_eq!(token.authorization_header(), "Bot abc");
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let token = AuthToken::new_unchecked(make_valid_token());
        let debug_output = format!("{token:?}");
        let display_output = token.to_string();

        assert!(!debug_output.contains(&make_valid_token()));
        assert!(display_output.contains("..."));
        assert!(!display_output.contains(&make_valid_token()));
    }
}
