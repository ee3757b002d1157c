//! gmailmd Core Library
//!
//! Extracts the hyperlinks from converted newsletter email, resolves short
//! and tracking URLs to their final destinations, and archives each unique
//! link as a small Markdown reference file.
//!
//! # Architecture
//!
//! The pipeline runs per email, one stage after another:
//! - [`parser`] - Link candidate extraction from Markdown/HTML bodies
//! - [`filter`] - Excluded link texts and blocked domains
//! - [`resolver`] - Redirect following under rate limiting and retry, arXiv rewriting
//! - [`persist`] - Run-wide deduplication and stub file writing
//! - [`pipeline`] - Stage composition and the run summary
//!
//! Supporting modules: [`config`] (run configuration), [`email`] (email
//! source collaborator) and [`outcome`] (shared outcome taxonomy).

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod email;
pub mod filter;
pub mod outcome;
pub mod parser;
pub mod persist;
pub mod pipeline;
pub mod resolver;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;
mod utils;

// Re-export commonly used types
pub use config::{ConfigError, LinkConfig};
pub use email::{EmailRecord, EmailSource, EmailSourceError, MarkdownArchiveSource};
pub use filter::{FilterDecision, LinkFilter};
pub use outcome::{FailureKind, RejectReason};
pub use parser::{ParseError, RawLink, extract_links};
pub use persist::{DedupSet, LinkPersister, PersistOutcome, PersistedLinkFile};
pub use pipeline::{LinkFailure, LinkPipeline, PipelineError, RunSummary};
pub use resolver::{
    ArxivTransformer, ContentKind, RateLimiter, RedirectResolver, ResolveStatus, ResolvedLink,
    RetryPolicy, TransformedLink,
};
