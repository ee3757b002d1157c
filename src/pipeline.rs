//! Per-email orchestration: extract, filter, resolve, transform, persist.
//!
//! Emails are processed one after another; within an email, links resolve
//! concurrently. Partial failures are counted in the [`RunSummary`] and never
//! abort a run. Only an unusable base output directory, a configuration error,
//! or an unreadable email source is fatal.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, LinkConfig};
use crate::email::{EmailRecord, EmailSource, EmailSourceError};
use crate::filter::{FilterDecision, LinkFilter};
use crate::outcome::{FailureKind, RejectReason};
use crate::parser::extract_links;
use crate::persist::{
    DedupSet, LinkPersister, PersistOutcome, PersistedLinkFile, normalize_url,
};
use crate::resolver::{ArxivTransformer, RedirectResolver};

/// Name of the per-date directory holding link stubs.
pub const LINKS_DIR_NAME: &str = "links";

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The base output directory exists but is not a directory.
    #[error("output path {path} is not a directory")]
    OutputNotDirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The base output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Emails could not be loaded.
    #[error(transparent)]
    Source(#[from] EmailSourceError),
}

/// One link that failed to resolve or to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFailure {
    /// URL as found in the email.
    pub url: String,
    /// Where the chain stopped or the stub pointed, when different from `url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    /// Failure category.
    pub kind: FailureKind,
    /// Error text for write failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Counts and records for a run (or a single email).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Emails processed.
    pub emails: usize,
    /// Link candidates found, including malformed ones.
    pub extracted: usize,
    /// Candidates that passed the filter.
    pub accepted: usize,
    /// Rejections per reason.
    pub rejected: BTreeMap<RejectReason, usize>,
    /// Links resolved to a final URL.
    pub resolved: usize,
    /// Resolution failures per kind.
    pub failed: BTreeMap<FailureKind, usize>,
    /// Resolved links whose destination is a blocked domain.
    pub blocked_after_resolution: usize,
    /// Stub files written or reused.
    pub persisted: usize,
    /// Links already persisted earlier in the run, including repeats skipped
    /// before resolution.
    pub duplicates: usize,
    /// Stub files that could not be written.
    pub write_errors: usize,
    /// Accepted links not resolved because the run was cancelled.
    pub skipped: usize,
    /// Per-link failure records.
    pub failures: Vec<LinkFailure>,
    /// Files written, in order.
    pub files: Vec<PersistedLinkFile>,
}

impl RunSummary {
    /// Total rejected candidates.
    #[must_use]
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Total resolution failures.
    #[must_use]
    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    fn reject(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_default() += 1;
    }

    fn fail(
        &mut self,
        url: String,
        final_url: String,
        kind: FailureKind,
        detail: Option<String>,
    ) {
        if kind == FailureKind::WriteError {
            self.write_errors += 1;
        } else {
            *self.failed.entry(kind).or_default() += 1;
        }
        let final_url = (final_url != url).then_some(final_url);
        self.failures.push(LinkFailure {
            url,
            final_url,
            kind,
            detail,
        });
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emails processed:   {}", self.emails)?;
        writeln!(f, "Links extracted:    {}", self.extracted)?;
        writeln!(f, "Accepted:           {}", self.accepted)?;
        writeln!(f, "Rejected:           {}", self.rejected_total())?;
        for (reason, count) in &self.rejected {
            writeln!(f, "  {reason}: {count}")?;
        }
        writeln!(f, "Resolved:           {}", self.resolved)?;
        writeln!(f, "Failed:             {}", self.failed_total())?;
        for (kind, count) in &self.failed {
            writeln!(f, "  {kind}: {count}")?;
        }
        writeln!(f, "Blocked after redirect: {}", self.blocked_after_resolution)?;
        writeln!(f, "Persisted:          {}", self.persisted)?;
        writeln!(f, "Duplicates:         {}", self.duplicates)?;
        writeln!(f, "Write errors:       {}", self.write_errors)?;
        write!(f, "Skipped (cancelled): {}", self.skipped)
    }
}

/// Composes the link stages for a run.
#[derive(Debug, Clone)]
pub struct LinkPipeline {
    filter: LinkFilter,
    resolver: RedirectResolver,
    transformer: ArxivTransformer,
    base_output_dir: PathBuf,
    recheck_final_domain: bool,
}

impl LinkPipeline {
    /// Creates a pipeline with an explicit resolver.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when no base output directory is configured.
    pub fn new(config: &LinkConfig, resolver: RedirectResolver) -> Result<Self, PipelineError> {
        Ok(Self {
            filter: LinkFilter::from_config(config),
            resolver,
            transformer: ArxivTransformer::new(),
            base_output_dir: config.require_output_dir()?.to_path_buf(),
            recheck_final_domain: config.recheck_final_domain,
        })
    }

    /// Creates the production pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for an invalid configuration or HTTP client failure.
    pub fn from_config(config: &LinkConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let resolver = RedirectResolver::from_config(config)?;
        Self::new(config, resolver)
    }

    /// Directory receiving link stubs for emails dated `date`.
    #[must_use]
    pub fn links_dir(&self, date: NaiveDate) -> PathBuf {
        links_dir(&self.base_output_dir, date)
    }

    /// Ensures the base output directory exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the directory is unusable.
    pub async fn prepare(&self) -> Result<(), PipelineError> {
        let path = &self.base_output_dir;
        match tokio::fs::metadata(path).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(PipelineError::OutputNotDirectory { path: path.clone() });
            }
            Ok(_) => return Ok(()),
            Err(_) => {}
        }
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: path.clone(),
                source,
            })
    }

    /// Loads emails from `source` and processes them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for fatal conditions only.
    pub async fn run_source(
        &self,
        source: &dyn EmailSource,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let emails = source.emails().await?;
        self.run(&emails, cancel).await
    }

    /// Processes every email with one run-wide dedup set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the base output directory is unusable.
    #[instrument(skip_all, fields(emails = emails.len()))]
    pub async fn run(
        &self,
        emails: &[EmailRecord],
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        self.prepare().await?;

        let mut seen = DedupSet::new();
        let mut summary = RunSummary::default();
        for email in emails {
            self.process_email(email, &mut seen, cancel, &mut summary)
                .await;
        }

        info!(
            emails = summary.emails,
            extracted = summary.extracted,
            persisted = summary.persisted,
            failed = summary.failed_total(),
            skipped = summary.skipped,
            "run complete"
        );
        Ok(summary)
    }

    /// Runs all stages for one email, adding its counts to `summary`.
    #[instrument(skip_all, fields(subject = %email.subject, date = %email.date))]
    pub async fn process_email(
        &self,
        email: &EmailRecord,
        seen: &mut DedupSet,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        summary.emails += 1;

        let decisions = self.filter.filter(extract_links(&email.body_markdown));
        summary.extracted += decisions.len();

        let mut accepted = Vec::new();
        for decision in decisions {
            match decision {
                FilterDecision::Accepted(link) => accepted.push(link),
                FilterDecision::Rejected { reason, .. } => summary.reject(reason),
            }
        }
        summary.accepted += accepted.len();
        debug!(accepted = accepted.len(), "filtered links");

        let mut in_email = HashSet::new();
        let mut to_resolve = Vec::with_capacity(accepted.len());
        for link in accepted {
            if seen.contains_source(&link.url) || !in_email.insert(normalize_url(&link.url)) {
                debug!(url = %link.url, "already handled in this run, not resolving again");
                summary.duplicates += 1;
                continue;
            }
            to_resolve.push(link);
        }

        let mut to_persist = Vec::new();
        for result in self.resolver.resolve_all(to_resolve, cancel).await {
            let Some(resolved) = result else {
                summary.skipped += 1;
                continue;
            };
            if let Some(kind) = resolved.failure() {
                summary.fail(resolved.original.url, resolved.final_url, kind, None);
                continue;
            }
            summary.resolved += 1;

            let link = self.transformer.transform(resolved);
            if self.recheck_final_domain && self.filter.is_blocked_url(&link.final_url) {
                info!(
                    url = %link.resolved.original.url,
                    final_url = %link.final_url,
                    "destination is a blocked domain, not persisting"
                );
                summary.blocked_after_resolution += 1;
                continue;
            }
            to_persist.push(link);
        }

        if to_persist.is_empty() {
            return;
        }

        let persister = LinkPersister::new(self.links_dir(email.date));
        for outcome in persister.persist(to_persist, seen).await {
            match outcome {
                PersistOutcome::Persisted(file) => {
                    summary.persisted += 1;
                    summary.files.push(file);
                }
                PersistOutcome::Duplicate { .. } => summary.duplicates += 1,
                PersistOutcome::Failed {
                    original,
                    url,
                    error,
                } => {
                    warn!(url = %url, error = %error, "write failed");
                    summary.fail(original, url, FailureKind::WriteError, Some(error.to_string()));
                }
            }
        }
    }
}

/// `<base>/<YYYY-MM-DD>/links`.
#[must_use]
pub fn links_dir(base_output_dir: &Path, date: NaiveDate) -> PathBuf {
    base_output_dir
        .join(date.format("%Y-%m-%d").to_string())
        .join(LINKS_DIR_NAME)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::{
        HopResponse, ManualClock, RateLimiter, RetryPolicy, Transport, TransportError,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Static redirect map; unknown URLs answer 200.
    #[derive(Debug, Default)]
    struct MapTransport {
        redirects: HashMap<String, String>,
        requests: Arc<AtomicUsize>,
    }

    impl MapTransport {
        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        fn counting(mut self, requests: &Arc<AtomicUsize>) -> Self {
            self.requests = Arc::clone(requests);
            self
        }
    }

    #[async_trait]
    impl Transport for MapTransport {
        async fn probe(&self, url: &str) -> Result<HopResponse, TransportError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if url.contains("unreachable") {
                return Ok(HopResponse::status(404));
            }
            Ok(self
                .redirects
                .get(url)
                .map_or_else(|| HopResponse::status(200), |to| HopResponse::redirect(301, to)))
        }
    }

    fn pipeline(config: &LinkConfig, transport: MapTransport) -> LinkPipeline {
        let limiter = Arc::new(RateLimiter::with_clock(
            1,
            Duration::from_secs(1),
            Arc::new(ManualClock::new()),
        ));
        let resolver = RedirectResolver::new(
            Arc::new(transport),
            limiter,
            RetryPolicy::with_max_attempts(2).without_jitter(),
            config.max_redirect_hops,
        );
        LinkPipeline::new(config, resolver).unwrap()
    }

    fn config(dir: &Path) -> LinkConfig {
        LinkConfig {
            base_output_dir: Some(dir.to_path_buf()),
            blocked_domains: vec!["blocked.com".to_string()],
            excluded_link_texts: vec!["Unsubscribe".to_string()],
            ..LinkConfig::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_run_counts_every_stage() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let pipeline = pipeline(
            &cfg,
            MapTransport::default().redirect("http://bit.ly/xyz", "https://example.com/post"),
        );
        let body = "\
[Read more](http://bit.ly/xyz)
[Unsubscribe](https://news.example.com/unsub)
[Ad](https://ads.blocked.com/click)
[Home](example.com)
[Gone](https://unreachable.example.com/)
[Paper](https://arxiv.org/abs/2301.01234)
";
        let emails = vec![EmailRecord::new(date(), "n", "Issue 1", body)];
        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.extracted, 6);
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.rejected[&RejectReason::ExcludedText], 1);
        assert_eq!(summary.rejected[&RejectReason::BlockedDomain], 1);
        assert_eq!(summary.rejected[&RejectReason::MalformedUrl], 1);
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.failed[&FailureKind::Unreachable], 1);
        assert_eq!(summary.persisted, 2);

        let dir = tmp.path().join("2024-01-15").join("links");
        let post = std::fs::read_to_string(dir.join("Read more.md")).unwrap();
        assert!(post.contains("URL: https://example.com/post\n"));
        assert!(post.contains("Original URL: http://bit.ly/xyz\n"));
        let paper = std::fs::read_to_string(dir.join("Paper.md")).unwrap();
        assert!(paper.contains("URL: https://arxiv.org/pdf/2301.01234\nKind: pdf\n"));
    }

    #[tokio::test]
    async fn test_blocked_after_resolution_is_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let transport = || MapTransport::default().redirect("http://bit.ly/xyz", "https://blocked.com/page");
        let emails = vec![EmailRecord::new(date(), "n", "s", "[Read more](http://bit.ly/xyz)")];

        let summary = pipeline(&cfg, transport())
            .run(&emails, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.blocked_after_resolution, 1);
        assert_eq!(summary.persisted, 0);
        assert!(!tmp.path().join("2024-01-15").join("links").exists());

        let cfg = LinkConfig {
            recheck_final_domain: false,
            ..cfg
        };
        let summary = pipeline(&cfg, transport())
            .run(&emails, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.persisted, 1);
        let content = std::fs::read_to_string(&summary.files[0].path).unwrap();
        assert!(content.contains("URL: https://blocked.com/page"));
    }

    #[tokio::test]
    async fn test_dedup_spans_emails() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let pipeline = pipeline(&cfg, MapTransport::default());
        let emails = vec![
            EmailRecord::new(date(), "a", "one", "[Story](https://example.com/s?utm_source=a)"),
            EmailRecord::new(date(), "b", "two", "See https://example.com/s/"),
        ];
        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_repeated_link_is_resolved_once_per_run() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let requests = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(&cfg, MapTransport::default().counting(&requests));
        let emails: Vec<_> = (0..3)
            .map(|i| EmailRecord::new(date(), "n", format!("Issue {i}"), "[x](https://example.com/p)"))
            .collect();

        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_link_within_email_is_resolved_once() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let requests = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(&cfg, MapTransport::default().counting(&requests));
        let body = "[Top story](https://example.com/p) ... [Read more](https://example.com/p#more)";
        let emails = vec![EmailRecord::new(date(), "n", "s", body)];

        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_link_is_retried_in_later_email() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let requests = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(&cfg, MapTransport::default().counting(&requests));
        let emails = vec![
            EmailRecord::new(date(), "n", "one", "[Gone](https://unreachable.example.com/)"),
            EmailRecord::new(date(), "n", "two", "[Gone](https://unreachable.example.com/)"),
        ];

        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.failed[&FailureKind::Unreachable], 2);
        assert_eq!(summary.duplicates, 0);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_records_link_from_email() {
        let tmp = TempDir::new().unwrap();
        let cfg = LinkConfig {
            max_redirect_hops: 1,
            ..config(tmp.path())
        };
        let pipeline = pipeline(
            &cfg,
            MapTransport::default()
                .redirect("http://bit.ly/a", "https://t.co/b")
                .redirect("https://t.co/b", "https://example.com/c"),
        );
        let emails = vec![EmailRecord::new(date(), "n", "s", "[Story](http://bit.ly/a)")];

        let summary = pipeline.run(&emails, &CancellationToken::new()).await.unwrap();

        assert_eq!(
            summary.failures,
            vec![LinkFailure {
                url: "http://bit.ly/a".to_string(),
                final_url: Some("https://t.co/b".to_string()),
                kind: FailureKind::TooManyRedirects,
                detail: None,
            }]
        );
    }

    #[test]
    fn test_blank_output_dir_is_config_error() {
        let cfg = LinkConfig {
            base_output_dir: Some(PathBuf::from("")),
            ..LinkConfig::default()
        };
        let err = LinkPipeline::from_config(&cfg).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::EmptyOutputDir)));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_resolution() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let pipeline = pipeline(&cfg, MapTransport::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let emails = vec![EmailRecord::new(date(), "a", "one", "https://a.com/ https://b.com/")];
        let summary = pipeline.run(&emails, &cancel).await.unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.persisted, 0);
    }

    #[tokio::test]
    async fn test_output_path_that_is_a_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("out");
        std::fs::write(&file, "x").unwrap();
        let cfg = config(&file);
        let err = pipeline(&cfg, MapTransport::default())
            .run(&[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputNotDirectory { .. }));
    }

    #[test]
    fn test_missing_output_dir_is_config_error() {
        let err = LinkPipeline::from_config(&LinkConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::MissingOutputDir)));
    }

    #[test]
    fn test_summary_serializes_snake_case_keys() {
        let mut summary = RunSummary::default();
        summary.reject(RejectReason::BlockedDomain);
        summary.fail(
            "https://x.com/".into(),
            "https://x.com/".into(),
            FailureKind::RedirectLoop,
            None,
        );
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rejected"]["blocked_domain"], 1);
        assert_eq!(json["failed"]["redirect_loop"], 1);
        assert_eq!(json["failures"][0]["kind"], "redirect_loop");
        assert!(json["failures"][0].get("final_url").is_none());
    }
}
