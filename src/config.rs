//! Run configuration for the link pipeline.
//!
//! [`LinkConfig`] is built once (defaults, then an optional TOML file, then CLI
//! overrides in the binary) and passed by reference into each component.
//! Library code never reads environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default maximum redirect hops per resolution chain.
pub const DEFAULT_MAX_REDIRECT_HOPS: usize = 10;

/// Default number of requests allowed per domain per window.
pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 1;

/// Default rate-limit window in milliseconds.
pub const DEFAULT_RATE_WINDOW_MS: u64 = 1000;

/// Default retries per request after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default number of concurrent resolutions per email.
pub const DEFAULT_CONCURRENCY: usize = 4;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Errors loading or validating configuration. Always fatal to a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has wrongly typed values.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Human-readable allowed range.
        expected: &'static str,
    },

    /// No base output directory was configured.
    #[error("`base_output_dir` is not set; pass --output-dir or set BASE_OUTPUT_DIR")]
    MissingOutputDir,

    /// The base output directory is empty or whitespace only.
    #[error("`base_output_dir` is empty; pass a directory path")]
    EmptyOutputDir,
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Domains whose links (and subdomains) are rejected.
    pub blocked_domains: Vec<String>,
    /// Link texts (exact, case-insensitive) whose links are rejected.
    pub excluded_link_texts: Vec<String>,
    /// Root of the dated output tree.
    pub base_output_dir: Option<PathBuf>,
    /// Requests allowed per domain per window.
    pub requests_per_window: u32,
    /// Rate-limit window in milliseconds (0 disables rate limiting).
    pub rate_window_ms: u64,
    /// Retries per request after the first attempt (0 means a single attempt).
    pub max_retries: u32,
    /// Maximum redirect hops per chain.
    pub max_redirect_hops: usize,
    /// Concurrent resolutions per email.
    pub concurrency: usize,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Re-check the final URL against the block list after redirects.
    pub recheck_final_domain: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            blocked_domains: Vec::new(),
            excluded_link_texts: Vec::new(),
            base_output_dir: None,
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            rate_window_ms: DEFAULT_RATE_WINDOW_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            recheck_final_domain: true,
        }
    }
}

impl LinkConfig {
    /// Loads configuration from a TOML file, filling unspecified fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without validating ranges.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("requests_per_window", u64::from(self.requests_per_window), 1, 1000, "1..=1000")?;
        check_range("rate_window_ms", self.rate_window_ms, 0, 600_000, "0..=600000")?;
        check_range("max_retries", u64::from(self.max_retries), 0, 10, "0..=10")?;
        check_range("max_redirect_hops", self.max_redirect_hops as u64, 1, 50, "1..=50")?;
        check_range("concurrency", self.concurrency as u64, 1, 32, "1..=32")?;
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600, "1..=3600")?;
        check_range("read_timeout_secs", self.read_timeout_secs, 1, 3600, "1..=3600")?;
        if self.base_output_dir.as_deref().is_some_and(is_blank_path) {
            return Err(ConfigError::EmptyOutputDir);
        }
        Ok(())
    }

    /// Returns the base output directory or an error if unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingOutputDir`] when no directory is configured
    /// and [`ConfigError::EmptyOutputDir`] when the path is blank.
    pub fn require_output_dir(&self) -> Result<&Path, ConfigError> {
        let dir = self
            .base_output_dir
            .as_deref()
            .ok_or(ConfigError::MissingOutputDir)?;
        if is_blank_path(dir) {
            return Err(ConfigError::EmptyOutputDir);
        }
        Ok(dir)
    }

    /// Rate-limit window as a duration.
    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    /// Connect timeout as a duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a duration.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Splits a comma-separated list (as used by `BLOCKED_DOMAINS`), trimming and dropping empties.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn is_blank_path(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

fn check_range(
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        })
    }
}
