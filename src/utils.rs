//! Shared helpers: static regex compilation, host normalization and matching.

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Normalizes a host string: lowercases, then strips a leading "www." and trailing '.'.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    host.trim_start_matches("www.")
        .trim_end_matches('.')
        .to_string()
}

/// Returns the lowercased host of `url`, or `None` when it has no usable host.
///
/// A host that is empty or whitespace-only counts as missing.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim().trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Returns true if `host` equals `domain` or is one of its subdomains.
///
/// Both sides are compared case-insensitively; `domain` may carry a leading
/// dot or `*.` wildcard prefix, which is ignored.
#[must_use]
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let domain = domain
        .trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if host.is_empty() || domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Resolves a possibly relative `Location` value against the URL that returned it.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match Url::parse(value) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base_url)
            .ok()?
            .join(value)
            .ok()
            .map(|url| url.to_string()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_host_strips_www_and_case() {
        assert_eq!(canonical_host(" WWW.ArXiv.org. "), "arxiv.org");
    }

    #[test]
    fn test_host_of_lowercases() {
        assert_eq!(host_of("https://Mail.Example.COM/x").as_deref(), Some("mail.example.com"));
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("file:///tmp/x"), None);
    }

    #[test]
    fn test_host_matches_domain_and_subdomains() {
        assert!(host_matches_domain("example.com", "example.com"));
        assert!(host_matches_domain("mail.example.com", "example.com"));
        assert!(host_matches_domain("a.b.example.com", "EXAMPLE.com"));
        assert!(host_matches_domain("mail.example.com", "*.example.com"));
        assert!(!host_matches_domain("notexample.com", "example.com"));
        assert!(!host_matches_domain("example.com.evil.net", "example.com"));
        assert!(!host_matches_domain("example.com", ""));
    }

    #[test]
    fn test_absolutize_url_relative_and_absolute() {
        assert_eq!(
            absolutize_url("/next", "https://a.com/start/here").as_deref(),
            Some("https://a.com/next")
        );
        assert_eq!(
            absolutize_url("step2", "https://a.com/start/here").as_deref(),
            Some("https://a.com/start/step2")
        );
        assert_eq!(
            absolutize_url("https://b.com/x", "https://a.com/").as_deref(),
            Some("https://b.com/x")
        );
        assert_eq!(absolutize_url("   ", "https://a.com/"), None);
    }
}
