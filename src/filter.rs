//! Exclusion rules applied to raw link candidates.
//!
//! Filtering is pure string and host comparison: it never touches the network
//! and never fails. Candidates that could not be parsed become
//! `rejected(malformed_url)` decisions.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::config::LinkConfig;
use crate::outcome::RejectReason;
use crate::parser::{ParseError, RawLink};
use crate::utils::{host_matches_domain, host_of};

/// Result of applying the filter to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// The link passed every rule.
    Accepted(RawLink),
    /// The link was rejected by a policy rule.
    Rejected {
        /// The rejected candidate.
        link: RawLink,
        /// Which rule rejected it.
        reason: RejectReason,
    },
}

impl FilterDecision {
    /// Returns the accepted link, if any.
    #[must_use]
    pub fn accepted(&self) -> Option<&RawLink> {
        match self {
            Self::Accepted(link) => Some(link),
            Self::Rejected { .. } => None,
        }
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// The candidate this decision is about.
    #[must_use]
    pub fn link(&self) -> &RawLink {
        match self {
            Self::Accepted(link) | Self::Rejected { link, .. } => link,
        }
    }
}

/// Link text exclusions and blocked domains for one run.
///
/// Both sets are stored trimmed and lower-cased; empty entries are dropped.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    excluded_texts: HashSet<String>,
    blocked_domains: Vec<String>,
}

impl LinkFilter {
    /// Creates a filter from excluded link texts and blocked domains.
    #[must_use]
    pub fn new<T, D>(excluded_texts: T, blocked_domains: D) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let excluded_texts = excluded_texts
            .into_iter()
            .filter_map(|t| normalize_entry(t.as_ref()))
            .collect();
        let mut blocked_domains: Vec<String> = blocked_domains
            .into_iter()
            .filter_map(|d| normalize_entry(d.as_ref()))
            .collect();
        blocked_domains.sort();
        blocked_domains.dedup();
        Self {
            excluded_texts,
            blocked_domains,
        }
    }

    /// Creates a filter from the run configuration.
    #[must_use]
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(&config.excluded_link_texts, &config.blocked_domains)
    }

    /// Number of excluded link texts.
    #[must_use]
    pub fn excluded_text_count(&self) -> usize {
        self.excluded_texts.len()
    }

    /// Number of blocked domains.
    #[must_use]
    pub fn blocked_domain_count(&self) -> usize {
        self.blocked_domains.len()
    }

    /// Applies the filter to every candidate, preserving order.
    #[instrument(skip_all)]
    pub fn filter<I>(&self, candidates: I) -> Vec<FilterDecision>
    where
        I: IntoIterator<Item = Result<RawLink, ParseError>>,
    {
        candidates
            .into_iter()
            .map(|candidate| self.decide(candidate))
            .collect()
    }

    /// Decides a single candidate.
    ///
    /// Text exclusion is checked before the host, so a link that is both
    /// excluded and blocked reports `excluded_text`.
    #[must_use]
    pub fn decide(&self, candidate: Result<RawLink, ParseError>) -> FilterDecision {
        let link = match candidate {
            Ok(link) => link,
            Err(err) => {
                debug!(url = err.url(), error = %err, "rejecting malformed link");
                return FilterDecision::Rejected {
                    link: RawLink::new(err.text(), err.url()),
                    reason: RejectReason::MalformedUrl,
                };
            }
        };

        if self.is_excluded_text(&link.text) {
            debug!(text = %link.text, url = %link.url, "rejecting excluded link text");
            return FilterDecision::Rejected {
                link,
                reason: RejectReason::ExcludedText,
            };
        }

        let Some(host) = host_of(&link.url) else {
            debug!(url = %link.url, "rejecting link without host");
            return FilterDecision::Rejected {
                link,
                reason: RejectReason::MalformedUrl,
            };
        };

        if self.is_blocked_host(&host) {
            debug!(url = %link.url, host = %host, "rejecting blocked domain");
            return FilterDecision::Rejected {
                link,
                reason: RejectReason::BlockedDomain,
            };
        }

        FilterDecision::Accepted(link)
    }

    /// Returns true if the trimmed text equals an excluded text (case-insensitive).
    #[must_use]
    pub fn is_excluded_text(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        !text.is_empty() && self.excluded_texts.contains(&text)
    }

    /// Returns true if the URL's host is a blocked domain or one of its subdomains.
    ///
    /// URLs without a host are not considered blocked.
    #[must_use]
    pub fn is_blocked_url(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| self.is_blocked_host(&host))
    }

    fn is_blocked_host(&self, host: &str) -> bool {
        self.blocked_domains
            .iter()
            .any(|domain| host_matches_domain(host, domain))
    }
}

fn normalize_entry(value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();
    (!value.is_empty()).then_some(value)
}
