//! Per-domain rate limiting for resolution requests.
//!
//! This module provides the [`RateLimiter`] struct which allows at most N
//! requests per rolling window to each domain. Requests beyond the quota
//! suspend until the window permits.
//!
//! # Overview
//!
//! Rate limiting is applied per-domain, meaning requests to different domains
//! can proceed in parallel without waiting for each other. When a server
//! answers HTTP 429 the domain's window is doubled (capped at 32x), and a
//! `Retry-After` value blocks the domain until it has passed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gmailmd_core::resolver::RateLimiter;
//!
//! # async fn example() {
//! // One request per second per domain
//! let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(1)));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://example.com/a").await;
//!
//! // Second request to same domain waits for the window
//! limiter.acquire("https://example.com/b").await;
//!
//! // Request to different domain proceeds immediately
//! limiter.acquire("https://other.com/c").await;
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, TokioClock};

/// Warning threshold for cumulative delay per domain (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Highest backoff level; the window is multiplied by `2^level`.
const MAX_BACKOFF_LEVEL: u32 = 5;

/// Per-domain rate limiter.
///
/// Designed to be wrapped in `Arc` and shared across concurrent resolutions.
/// `DashMap` holds per-domain state; each domain's window is guarded by a
/// `tokio::sync::Mutex` that stays locked while the caller waits, so two
/// workers can never both claim the same free slot.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed per window.
    max_requests: usize,

    /// Nominal window length.
    window: Duration,

    /// Whether rate limiting is disabled.
    disabled: bool,

    /// Per-domain state tracking.
    /// Uses Arc to allow cloning the state and releasing the `DashMap` lock
    /// before awaiting on the inner Mutex (prevents shard lock across await).
    domains: DashMap<String, Arc<DomainState>>,

    clock: Arc<dyn Clock>,
}

/// State tracked for each domain.
#[derive(Debug)]
struct DomainState {
    /// Start instants of the requests inside the current window, oldest first.
    recent: Mutex<VecDeque<Instant>>,

    /// Number of 429 responses seen; doubles the window per level.
    backoff_level: AtomicU32,

    /// Server-mandated quiet period from a Retry-After header.
    blocked_until: std::sync::Mutex<Option<Instant>>,

    /// Cumulative delay applied to this domain (in milliseconds).
    /// Used to warn when excessive rate limiting occurs.
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    fn new() -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            backoff_level: AtomicU32::new(0),
            blocked_until: std::sync::Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Adds to the cumulative delay and returns the new total.
    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }

    fn blocked_until(&self) -> Option<Instant> {
        *self
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn extend_block(&self, until: Instant) {
        let mut guard = self
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_none_or(|current| current < until) {
            *guard = Some(until);
        }
    }
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window` per domain.
    ///
    /// A zero quota or zero window yields a disabled limiter.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, Arc::new(TokioClock))
    }

    /// Creates a limiter with an explicit clock.
    #[must_use]
    #[instrument(skip(clock), fields(window_ms = window.as_millis()))]
    pub fn with_clock(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let disabled = max_requests == 0 || window.is_zero();
        debug!(disabled, "creating rate limiter");
        Self {
            max_requests: max_requests as usize,
            window,
            disabled,
            domains: DashMap::new(),
            clock,
        }
    }

    /// Creates a disabled rate limiter that applies no delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the nominal window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the clock used for waiting.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Acquires permission to make a request to the given URL's domain.
    ///
    /// Waits while the domain's quota for the current window is used up, or
    /// while a server-mandated Retry-After period is active. The first
    /// request to any domain proceeds immediately.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        // Get or create domain state, clone Arc to release DashMap lock before awaiting
        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone();

        let mut recent = state.recent.lock().await;

        loop {
            let now = self.clock.now();

            let wait = if let Some(until) = state.blocked_until().filter(|until| *until > now) {
                until - now
            } else {
                let window = self.effective_window(state.backoff_level.load(Ordering::SeqCst));
                while recent
                    .front()
                    .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
                {
                    recent.pop_front();
                }

                if recent.len() < self.max_requests {
                    recent.push_back(now);
                    return;
                }

                match recent.front() {
                    Some(oldest) => window.saturating_sub(now.saturating_duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            let cumulative = state.add_cumulative_delay(wait);
            debug!(
                domain = %domain,
                delay_ms = wait.as_millis(),
                cumulative_ms = cumulative.as_millis(),
                "applying rate limit delay"
            );

            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    domain = %domain,
                    cumulative_delay_secs = cumulative.as_secs(),
                    "excessive rate limiting - consider reducing request volume to this domain"
                );
            }

            self.clock.sleep(wait).await;
        }
    }

    /// Records an HTTP 429 from `url`'s domain.
    ///
    /// Doubles the domain's window (capped at 32x the nominal window) and, when
    /// the server sent a Retry-After delay, blocks the domain until it passes.
    /// Returns the new backoff level.
    #[instrument(skip(self), fields(domain))]
    pub fn record_rate_limit(&self, url: &str, retry_after: Option<Duration>) -> u32 {
        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone();

        let level = state
            .backoff_level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |level| {
                Some((level + 1).min(MAX_BACKOFF_LEVEL))
            })
            .map_or(MAX_BACKOFF_LEVEL, |previous| (previous + 1).min(MAX_BACKOFF_LEVEL));

        if let Some(delay) = retry_after {
            state.extend_block(self.clock.now() + delay.min(MAX_RETRY_AFTER));
            let cumulative = state.add_cumulative_delay(delay);
            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    domain = %domain,
                    cumulative_delay_secs = cumulative.as_secs(),
                    "excessive server rate limiting - site may be under heavy load"
                );
            }
        }

        debug!(
            domain = %domain,
            backoff_level = level,
            window_ms = self.effective_window(level).as_millis(),
            retry_after_ms = retry_after.map(|d| d.as_millis()),
            "recorded server rate limit"
        );
        level
    }

    /// Current backoff level for the URL's domain (0 when never throttled).
    #[must_use]
    pub fn backoff_level(&self, url: &str) -> u32 {
        self.domains
            .get(&extract_domain(url))
            .map_or(0, |state| state.backoff_level.load(Ordering::SeqCst))
    }

    /// Window currently applied to the URL's domain.
    #[must_use]
    pub fn current_window(&self, url: &str) -> Duration {
        self.effective_window(self.backoff_level(url))
    }

    fn effective_window(&self, level: u32) -> Duration {
        self.window
            .saturating_mul(1 << level.min(MAX_BACKOFF_LEVEL))
    }
}

/// Extracts the domain from a URL.
///
/// Returns "unknown" for malformed URLs, ensuring all requests are still
/// rate limited even if the URL cannot be parsed.
///
/// # Examples
///
/// ```
/// use gmailmd_core::resolver::extract_domain;
///
/// assert_eq!(extract_domain("https://example.com/path"), "example.com");
/// assert_eq!(extract_domain("http://Example.COM/Path"), "example.com");
/// assert_eq!(extract_domain("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gmailmd_core::resolver::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();

        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(
                header_value,
                "Retry-After date is in the past, returning zero"
            );
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
