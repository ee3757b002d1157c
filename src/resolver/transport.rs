//! HTTP seam for the redirect resolver.
//!
//! The resolver never talks to reqwest directly: it asks a [`Transport`] for
//! one hop at a time. [`HttpTransport`] is the production implementation; tests
//! substitute scripted fakes.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, redirect};
use tracing::{debug, instrument, trace};

use super::error::TransportError;
use super::rate_limiter::parse_retry_after;
use crate::config::LinkConfig;
use crate::parser::{collapse_whitespace, decode_entities};
use crate::user_agent;
use crate::utils::compile_static_regex;

/// Maximum number of body bytes scanned for a `<title>` on the GET fallback.
const MAX_TITLE_SCAN_BYTES: usize = 64 * 1024;

static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<title[^>]*>(.*?)</title\s*>"));

/// The part of one HTTP response the resolver cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Location` header, if present.
    pub location: Option<String>,
    /// Parsed `Retry-After` header, if present and valid.
    pub retry_after: Option<Duration>,
    /// Media type from `Content-Type`, lowercased and without parameters.
    pub content_type: Option<String>,
    /// Page `<title>`, only when a GET body was already being read.
    pub title: Option<String>,
}

impl HopResponse {
    /// Creates a response with just a status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Creates a redirect response pointing at `location`.
    #[must_use]
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
            ..Self::default()
        }
    }

    /// Returns true for the redirect codes that are followed (301/302/303/307/308).
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Performs a single HTTP request without following redirects.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Requests `url` and reports the response without following redirects.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no HTTP response was obtained at all.
    /// HTTP error statuses are successful probes.
    async fn probe(&self, url: &str) -> Result<HopResponse, TransportError>;
}

/// reqwest-backed transport: HEAD first, GET when HEAD is not allowed.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the HTTP client cannot be constructed.
    pub fn new(config: &LinkConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeouts(config.connect_timeout(), config.read_timeout())
    }

    /// Builds a transport with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the HTTP client cannot be constructed.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, method: Method, url: &str) -> Result<Response, TransportError> {
        self.client
            .request(method, url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self))]
    async fn probe(&self, url: &str) -> Result<HopResponse, TransportError> {
        let response = self.send(Method::HEAD, url).await?;
        let status = response.status().as_u16();
        if !matches!(status, 405 | 501) {
            return Ok(hop_from_headers(&response));
        }

        debug!(status, "HEAD not supported, falling back to GET");
        let mut response = self.send(Method::GET, url).await?;
        let mut hop = hop_from_headers(&response);
        if response.status().is_success() && is_html(&response) {
            hop.title = read_title(url, &mut response).await;
        }
        Ok(hop)
    }
}

fn hop_from_headers(response: &Response) -> HopResponse {
    let headers = response.headers();
    HopResponse {
        status: response.status().as_u16(),
        location: headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        retry_after: headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after),
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type),
        title: None,
    }
}

/// `"Application/PDF; qs=0.9"` -> `"application/pdf"`.
fn media_type(value: &str) -> Option<String> {
    let media = value.split(';').next()?.trim().to_ascii_lowercase();
    (!media.is_empty()).then_some(media)
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|ct| ct.to_ascii_lowercase().contains("html"))
}

async fn read_title(url: &str, response: &mut Response) -> Option<String> {
    let mut body = Vec::new();
    while body.len() < MAX_TITLE_SCAN_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(error) => {
                trace!(url, error = %error, "stopped reading body for title");
                break;
            }
        }
    }
    body.truncate(MAX_TITLE_SCAN_BYTES);
    extract_title(&String::from_utf8_lossy(&body))
}

/// Extracts the text of the first `<title>` element, entity-decoded and whitespace-collapsed.
#[must_use]
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_TAG.captures(html)?.get(1)?.as_str();
    let title = collapse_whitespace(&decode_entities(raw));
    (!title.is_empty()).then_some(title)
}
