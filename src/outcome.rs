//! Outcome taxonomy shared by every pipeline stage.
//!
//! Policy rejections (`malformed_url`, `excluded_text`, `blocked_domain`) are
//! expected filtering results. Resolution failures and `write_error` are
//! recorded per link and never abort a run.

use std::fmt;

use serde::Serialize;

/// Why a raw link was not accepted by the filter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// URL had no scheme, an unsupported scheme, no host, or failed to parse.
    MalformedUrl,
    /// Trimmed link text matched an excluded text.
    ExcludedText,
    /// Host equals or is a subdomain of a blocked domain.
    BlockedDomain,
}

impl RejectReason {
    /// Stable snake_case label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedUrl => "malformed_url",
            Self::ExcludedText => "excluded_text",
            Self::BlockedDomain => "blocked_domain",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a link could not be resolved to a final destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Redirect chain exceeded the configured hop limit.
    TooManyRedirects,
    /// Redirect chain revisited a URL.
    RedirectLoop,
    /// Transient failures persisted through every retry attempt.
    NetworkError,
    /// Non-retryable failure (4xx, DNS, TLS).
    Unreachable,
    /// Stub file could not be written.
    WriteError,
}

impl FailureKind {
    /// Stable snake_case label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooManyRedirects => "too_many_redirects",
            Self::RedirectLoop => "redirect_loop",
            Self::NetworkError => "network_error",
            Self::Unreachable => "unreachable",
            Self::WriteError => "write_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
