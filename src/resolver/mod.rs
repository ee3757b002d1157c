//! Redirect resolution for accepted links.
//!
//! This module turns short and tracking URLs into their final destinations
//! and tags the result for persistence.
//!
//! # Architecture
//!
//! - [`RedirectResolver`] - Follows redirect chains hop by hop under policy
//! - [`Transport`] - One-request HTTP seam; [`HttpTransport`] is the reqwest implementation
//! - [`RateLimiter`] - Per-domain rolling-window limiter with 429 backoff
//! - [`RetryPolicy`] - Exponential backoff with jitter for transient failures
//! - [`Clock`] - Injectable time source shared by the limiter and retry sleeps
//! - [`ArxivTransformer`] - Rewrites arXiv abstract pages to their PDF URL
//!
//! # Example
//!
//! ```no_run
//! use gmailmd_core::config::LinkConfig;
//! use gmailmd_core::parser::RawLink;
//! use gmailmd_core::resolver::{ArxivTransformer, RedirectResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = RedirectResolver::from_config(&LinkConfig::default())?;
//! let resolved = resolver
//!     .resolve(RawLink::new("Read more", "http://bit.ly/xyz"))
//!     .await;
//! let link = ArxivTransformer::new().transform(resolved);
//! println!("{} ({})", link.final_url, link.content_kind);
//! # Ok(())
//! # }
//! ```

mod arxiv;
mod clock;
mod error;
mod rate_limiter;
mod redirect;
mod retry;
mod transport;

pub use arxiv::{ArxivTransformer, ContentKind, TransformedLink};
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::TransportError;
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use redirect::{RedirectResolver, ResolveStatus, ResolvedLink};
pub use retry::{
    FailureType, RetryDecision, RetryPolicy, classify_status, classify_transport_error,
};
pub use transport::{HopResponse, HttpTransport, Transport, extract_title};
