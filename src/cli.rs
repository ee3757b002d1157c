//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use gmailmd_core::LinkConfig;

/// Extract, resolve and archive the links found in newsletter email.
///
/// Reads archived email Markdown (files or directories), follows every link
/// to its final destination and writes one reference file per unique link
/// under `<output-dir>/<date>/links/`.
#[derive(Parser, Debug)]
#[command(name = "gmailmd")]
#[command(author, version, about)]
pub struct Args {
    /// Archived email Markdown files or directories to process
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// TOML config file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base output directory
    #[arg(short = 'o', long, env = "BASE_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Blocked domains, comma separated (subdomains are blocked too)
    #[arg(long = "block", env = "BLOCKED_DOMAINS", value_delimiter = ',', value_name = "DOMAIN")]
    pub blocked_domains: Vec<String>,

    /// Link texts to ignore, comma separated (case-insensitive exact match)
    #[arg(long = "exclude-text", env = "EXCLUDED_LINK_TEXTS", value_delimiter = ',', value_name = "TEXT")]
    pub excluded_link_texts: Vec<String>,

    /// Maximum concurrent resolutions per email (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Retries per request after the first attempt (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Rate-limit window per domain in milliseconds (0 to disable, max 600000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub rate_limit: Option<u64>,

    /// Requests allowed per domain per window (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub requests_per_window: Option<u32>,

    /// Maximum redirect hops per link (1-50)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub max_redirects: Option<u8>,

    /// Keep links whose final destination is a blocked domain
    #[arg(long)]
    pub no_recheck: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Default log level when `RUST_LOG` is not set.
    ///
    /// Priority: quiet flag > verbose flag > info.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Applies flag (and env) values on top of file or default configuration.
    ///
    /// Domain and text lists extend the configured lists.
    pub fn apply(&self, config: &mut LinkConfig) {
        if let Some(dir) = &self.output_dir {
            config.base_output_dir = Some(dir.clone());
        }
        config
            .blocked_domains
            .extend(self.blocked_domains.iter().cloned());
        config
            .excluded_link_texts
            .extend(self.excluded_link_texts.iter().cloned());
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = u32::from(max_retries);
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_window_ms = rate_limit;
        }
        if let Some(requests) = self.requests_per_window {
            config.requests_per_window = requests;
        }
        if let Some(hops) = self.max_redirects {
            config.max_redirect_hops = usize::from(hops);
        }
        if self.no_recheck {
            config.recheck_final_domain = false;
        }
    }
}
