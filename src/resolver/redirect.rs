//! Manual redirect following under rate limiting and retry policy.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::rate_limiter::RateLimiter;
use super::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_status, classify_transport_error,
};
use super::transport::{HopResponse, HttpTransport, Transport};
use crate::config::{DEFAULT_CONCURRENCY, LinkConfig};
use crate::outcome::FailureKind;
use crate::parser::RawLink;
use crate::utils::absolutize_url;

/// Whether resolution reached a final destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "kind")]
pub enum ResolveStatus {
    /// The chain ended in a non-redirect response.
    Resolved,
    /// The chain could not be completed.
    Failed(FailureKind),
}

/// An accepted link after following its redirect chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    /// The candidate this resolution started from.
    pub original: RawLink,
    /// Last URL reached; the original URL when the first request failed.
    pub final_url: String,
    /// Outcome of the chain.
    pub status: ResolveStatus,
    /// Redirect hops followed.
    pub redirect_count: usize,
    /// `<title>` of the final page, when the GET fallback already read it.
    pub page_title: Option<String>,
    /// Media type reported by the final response.
    pub content_type: Option<String>,
}

impl ResolvedLink {
    /// Returns true if the chain reached a final destination.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == ResolveStatus::Resolved
    }

    /// The failure kind, if resolution failed.
    #[must_use]
    pub fn failure(&self) -> Option<FailureKind> {
        match self.status {
            ResolveStatus::Resolved => None,
            ResolveStatus::Failed(kind) => Some(kind),
        }
    }
}

/// Follows redirect chains for accepted links.
///
/// One resolver (and its rate limiter) is shared by every email in a run.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_hops: usize,
    concurrency: usize,
}

impl RedirectResolver {
    /// Creates a resolver from its collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        max_hops: usize,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            max_hops,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Builds the production resolver (reqwest transport, tokio clock) from configuration.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the HTTP client cannot be constructed.
    pub fn from_config(config: &LinkConfig) -> Result<Self, reqwest::Error> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let limiter = Arc::new(RateLimiter::new(
            config.requests_per_window,
            config.rate_window(),
        ));
        Ok(Self::new(
            transport,
            limiter,
            RetryPolicy::with_max_retries(config.max_retries),
            config.max_redirect_hops,
        )
        .with_concurrency(config.concurrency))
    }

    /// Sets how many links are resolved at once (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolves every link with bounded concurrency, preserving input order.
    ///
    /// Links not yet started when `cancel` fires are returned as `None`;
    /// resolutions already in flight run to completion.
    #[instrument(skip_all, fields(count = links.len(), concurrency = self.concurrency))]
    pub async fn resolve_all(
        &self,
        links: Vec<RawLink>,
        cancel: &CancellationToken,
    ) -> Vec<Option<ResolvedLink>> {
        stream::iter(links)
            .map(|link| async move {
                if cancel.is_cancelled() {
                    debug!(url = %link.url, "cancelled before resolution started");
                    return None;
                }
                Some(self.resolve(link).await)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Follows the redirect chain of one link.
    ///
    /// Never fails: every problem is reported through [`ResolveStatus::Failed`].
    #[instrument(skip(self, link), fields(url = %link.url))]
    pub async fn resolve(&self, link: RawLink) -> ResolvedLink {
        let mut current = link.url.clone();
        let mut visited = HashSet::from([loop_key(&current)]);
        let mut hops = 0;

        loop {
            let hop = match self.fetch_hop(&current).await {
                Ok(hop) => hop,
                Err(kind) => {
                    warn!(final_url = %current, hops, kind = %kind, "resolution failed");
                    return finish(link, current, ResolveStatus::Failed(kind), hops, None);
                }
            };

            let next = if hop.is_redirect() {
                hop.location
                    .as_deref()
                    .and_then(|location| absolutize_url(location, &current))
                    .filter(|next| is_web_url(next))
            } else {
                None
            };

            let Some(next) = next else {
                debug!(final_url = %current, hops, status = hop.status, "resolved");
                return finish(link, current, ResolveStatus::Resolved, hops, Some(hop));
            };

            if !visited.insert(loop_key(&next)) {
                warn!(from = %current, to = %next, hops, "redirect loop detected");
                return finish(
                    link,
                    current,
                    ResolveStatus::Failed(FailureKind::RedirectLoop),
                    hops,
                    None,
                );
            }

            hops += 1;
            if hops > self.max_hops {
                warn!(max_hops = self.max_hops, "redirect hop limit exceeded");
                return finish(
                    link,
                    current,
                    ResolveStatus::Failed(FailureKind::TooManyRedirects),
                    hops - 1,
                    None,
                );
            }

            debug!(from = %current, to = %next, hop = hops, "following redirect");
            current = next;
        }
    }

    /// Requests one URL under the rate limiter, retrying per policy.
    async fn fetch_hop(&self, url: &str) -> Result<HopResponse, FailureKind> {
        let mut attempt = 1;
        loop {
            self.limiter.acquire(url).await;

            let (failure_type, retry_after) = match self.transport.probe(url).await {
                Ok(hop) if hop.status == 429 => {
                    self.limiter.record_rate_limit(url, hop.retry_after);
                    (FailureType::RateLimited, hop.retry_after)
                }
                Ok(hop) if hop.status < 400 => return Ok(hop),
                Ok(hop) => {
                    debug!(url, status = hop.status, attempt, "error status");
                    (classify_status(hop.status), None)
                }
                Err(error) => {
                    debug!(url, error = %error, attempt, "request failed");
                    (classify_transport_error(&error), None)
                }
            };

            match self.retry.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    let delay = retry_after.map_or(delay, |minimum| delay.max(minimum));
                    info!(
                        url,
                        attempt = next,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis(),
                        "retrying request"
                    );
                    self.limiter.clock().sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, reason = %reason, "giving up");
                    return Err(match failure_type {
                        FailureType::Permanent => FailureKind::Unreachable,
                        FailureType::Transient | FailureType::RateLimited => {
                            FailureKind::NetworkError
                        }
                    });
                }
            }
        }
    }
}

fn finish(
    original: RawLink,
    final_url: String,
    status: ResolveStatus,
    redirect_count: usize,
    final_hop: Option<HopResponse>,
) -> ResolvedLink {
    let (page_title, content_type) =
        final_hop.map_or((None, None), |hop| (hop.title, hop.content_type));
    ResolvedLink {
        original,
        final_url,
        status,
        redirect_count,
        page_title,
        content_type,
    }
}

/// Parsed-and-reserialized form so `https://a.com` and `https://a.com/` compare equal.
fn loop_key(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), |u| u.to_string())
}

fn is_web_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
