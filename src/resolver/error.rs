//! Errors raised by a single HTTP probe.
//!
//! These never escape the resolver: the redirect loop classifies them and
//! turns them into a [`FailureKind`](crate::outcome::FailureKind) on the
//! resolved link.

use thiserror::Error;

/// Failure to obtain any HTTP response for one request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// TCP connection could not be established (refused, reset, unreachable network).
    #[error("connection failed for {url}: {message}")]
    Connect {
        /// The URL being requested.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// Host name could not be resolved.
    #[error("DNS lookup failed for {url}: {message}")]
    Dns {
        /// The URL being requested.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// TLS handshake or certificate validation failed.
    #[error("TLS error for {url}: {message}")]
    Tls {
        /// The URL being requested.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// Any other transport-level failure.
    #[error("network error requesting {url}: {message}")]
    Network {
        /// The URL being requested.
        url: String,
        /// Underlying error text.
        message: String,
    },
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error.
    pub fn connect(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a DNS error.
    pub fn dns(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dns {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a TLS error.
    pub fn tls(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tls {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a generic network error.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Classifies a reqwest error by inspecting its kind and message chain.
    #[must_use]
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::timeout(url);
        }

        let message = error_chain_text(error);
        let lower = message.to_lowercase();
        if lower.contains("certificate")
            || lower.contains("tls")
            || lower.contains("ssl")
            || lower.contains("handshake")
        {
            Self::tls(url, message)
        } else if lower.contains("dns")
            || lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("no such host")
        {
            Self::dns(url, message)
        } else if error.is_connect() {
            Self::connect(url, message)
        } else {
            Self::network(url, message)
        }
    }

    /// The URL of the failed request.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Dns { url, .. }
            | Self::Tls { url, .. }
            | Self::Network { url, .. } => url,
        }
    }
}

fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_url() {
        let err = TransportError::dns("https://nowhere.invalid/", "no such host");
        assert_eq!(
            err.to_string(),
            "DNS lookup failed for https://nowhere.invalid/: no such host"
        );
        assert_eq!(err.url(), "https://nowhere.invalid/");
    }

    #[test]
    fn test_timeout_display() {
        let err = TransportError::timeout("https://slow.example.com/");
        assert_eq!(err.to_string(), "timeout requesting https://slow.example.com/");
    }
}
