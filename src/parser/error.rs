//! Error types for link candidate extraction.

use thiserror::Error;

/// Maximum URL length to accept (standard browser limit).
/// URLs longer than this are rejected to prevent memory issues.
pub const MAX_URL_LENGTH: usize = 2000;

/// Errors produced while validating an extracted link target.
///
/// These never abort extraction; the filter stage folds them into a
/// `malformed_url` rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// URL is malformed, has no scheme, or uses an unsupported scheme
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The link target that failed validation
        url: String,
        /// Link text the target was found with
        text: String,
        /// Why the URL is invalid
        reason: String,
    },

    /// URL exceeds maximum allowed length
    #[error("URL too long ({length} chars, max {max}): {url_preview}...")]
    UrlTooLong {
        /// Truncated URL for display
        url_preview: String,
        /// Link text the target was found with
        text: String,
        /// Actual length
        length: usize,
        /// Maximum allowed
        max: usize,
    },
}

impl ParseError {
    /// Creates an `InvalidUrl` error for a target without a scheme.
    #[must_use]
    pub fn missing_scheme(url: &str, text: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            text: text.to_string(),
            reason: "URL has no scheme".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a non-web URL scheme.
    #[must_use]
    pub fn unsupported_scheme(url: &str, text: &str, scheme: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            text: text.to_string(),
            reason: format!("scheme '{scheme}' is not supported"),
        }
    }

    /// Creates an `InvalidUrl` error for a malformed URL.
    #[must_use]
    pub fn malformed(url: &str, text: &str, parse_error: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            text: text.to_string(),
            reason: parse_error.to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a URL without a usable host.
    #[must_use]
    pub fn no_host(url: &str, text: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            text: text.to_string(),
            reason: "URL has no host".to_string(),
        }
    }

    /// Creates a `UrlTooLong` error for URLs exceeding the maximum length.
    #[must_use]
    pub fn too_long(url: &str, text: &str) -> Self {
        Self::UrlTooLong {
            url_preview: url.chars().take(50).collect(),
            text: text.to_string(),
            length: url.len(),
            max: MAX_URL_LENGTH,
        }
    }

    /// The offending target (truncated for over-long URLs).
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. } => url,
            Self::UrlTooLong { url_preview, .. } => url_preview,
        }
    }

    /// The link text the target was found with.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::InvalidUrl { text, .. } | Self::UrlTooLong { text, .. } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_unsupported_scheme_message() {
        let err = ParseError::unsupported_scheme("mailto:a@example.com", "Email us", "mailto");
        let msg = err.to_string();
        assert!(msg.contains("mailto:a@example.com"), "should contain URL");
        assert!(msg.contains("'mailto'"), "should contain scheme");
        assert_eq!(err.text(), "Email us");
    }

    #[test]
    fn test_parse_error_missing_scheme_message() {
        let err = ParseError::missing_scheme("example.com/page", "Read");
        assert!(err.to_string().contains("no scheme"));
        assert_eq!(err.url(), "example.com/page");
    }

    #[test]
    fn test_parse_error_too_long_message() {
        let long_url = "https://example.com/".to_string() + &"a".repeat(2500);
        let err = ParseError::too_long(&long_url, "");
        let msg = err.to_string();
        assert!(msg.contains("too long"), "should mention too long");
        assert!(msg.contains("2000"), "should mention max length");
        assert_eq!(err.url().chars().count(), 50);
    }
}
