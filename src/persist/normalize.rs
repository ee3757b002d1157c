//! URL normalization and the run-scoped dedup set.

use std::collections::HashSet;

use url::Url;

/// Query parameters that only carry campaign tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref_src",
    "ck_subscriber_id",
    "_hsenc",
    "_hsmi",
    "mkt_tok",
];

/// Normalizes a URL for duplicate detection.
///
/// Drops the fragment, tracking query parameters (`utm_*` and common
/// newsletter/ad click ids) and a trailing path slash; scheme and host are
/// lower-cased. Unparseable input is returned trimmed.
///
/// # Examples
///
/// ```
/// use gmailmd_core::persist::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTPS://Example.com/post/?utm_source=news&id=7#top"),
///     "https://example.com/post?id=7"
/// );
/// ```
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.trim().to_string();
    };

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = parsed.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        parsed.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    parsed.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalized URLs already persisted in this run.
///
/// Final URLs are tracked for persistence; the URLs found in the email are
/// tracked too so a repeated link can skip resolution entirely.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
    sources: HashSet<String>,
}

impl DedupSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the URL (after normalization) was already recorded.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(&normalize_url(url))
    }

    /// Records the URL; returns false if it was already present.
    pub fn insert(&mut self, url: &str) -> bool {
        self.seen.insert(normalize_url(url))
    }

    /// Returns true if a link found under this URL in an email was already persisted.
    #[must_use]
    pub fn contains_source(&self, url: &str) -> bool {
        self.sources.contains(&normalize_url(url))
    }

    /// Records the URL a persisted link was found under.
    pub fn insert_source(&mut self, url: &str) -> bool {
        self.sources.insert(normalize_url(url))
    }

    /// Number of distinct final URLs recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
