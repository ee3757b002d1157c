//! Email source collaborator: already-converted email documents.
//!
//! The pipeline never fetches mail itself. It consumes [`EmailRecord`]s from
//! an [`EmailSource`]. [`MarkdownArchiveSource`] reads the archive layout
//! written by the mail exporter:
//!
//! ```text
//! <base>/<YYYY-MM-DD>/<sender>/<subject>.md
//! ```
//!
//! where each file starts with a `Subject:` / `From:` / `Date:` header block
//! followed by a blank line and the Markdown body.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Directory name holding link stubs; never scanned for emails.
const LINKS_DIR_NAME: &str = "links";

/// One converted email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    /// Date used for the output folder.
    pub date: NaiveDate,
    /// Raw `From:` value.
    pub sender: String,
    /// Raw `Subject:` value.
    pub subject: String,
    /// Markdown body without the header block.
    pub body_markdown: String,
    /// File the record was read from, if any.
    pub source: Option<PathBuf>,
}

impl EmailRecord {
    /// Creates a record from in-memory content.
    #[must_use]
    pub fn new(
        date: NaiveDate,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body_markdown: impl Into<String>,
    ) -> Self {
        Self {
            date,
            sender: sender.into(),
            subject: subject.into(),
            body_markdown: body_markdown.into(),
            source: None,
        }
    }
}

/// Errors loading emails from a source.
#[derive(Debug, Error)]
pub enum EmailSourceError {
    /// An input path does not exist.
    #[error("input not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The unreadable path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Supplies emails to the pipeline.
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Loads every email this source provides, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`EmailSourceError`] when the source cannot be read at all.
    async fn emails(&self) -> Result<Vec<EmailRecord>, EmailSourceError>;
}

/// Reads archived email Markdown files from files and directories.
#[derive(Debug, Clone)]
pub struct MarkdownArchiveSource {
    inputs: Vec<PathBuf>,
    today: NaiveDate,
}

impl MarkdownArchiveSource {
    /// Creates a source over the given files and directories (scanned recursively).
    #[must_use]
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            today: Local::now().date_naive(),
        }
    }

    /// Overrides the date used when neither the path nor the header carries one.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    async fn collect_files(&self) -> Result<Vec<PathBuf>, EmailSourceError> {
        let mut files = Vec::new();
        for input in &self.inputs {
            let metadata = fs::metadata(input).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    EmailSourceError::NotFound {
                        path: input.clone(),
                    }
                } else {
                    EmailSourceError::Read {
                        path: input.clone(),
                        source,
                    }
                }
            })?;

            if metadata.is_dir() {
                let mut found = walk_markdown(input).await?;
                found.sort();
                files.extend(found);
            } else {
                files.push(input.clone());
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl EmailSource for MarkdownArchiveSource {
    #[instrument(skip(self), fields(inputs = self.inputs.len()))]
    async fn emails(&self) -> Result<Vec<EmailRecord>, EmailSourceError> {
        let files = self.collect_files().await?;
        let mut records = Vec::with_capacity(files.len());

        for path in files {
            let raw = match fs::read(&path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(source) => return Err(EmailSourceError::Read { path, source }),
            };
            let mut record = parse_email(&raw, self.today);
            if let Some(date) = date_from_path(&path) {
                record.date = date;
            }
            debug!(path = %path.display(), subject = %record.subject, date = %record.date, "loaded email");
            record.source = Some(path);
            records.push(record);
        }

        Ok(records)
    }
}

async fn walk_markdown(root: &Path) -> Result<Vec<PathBuf>, EmailSourceError> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|source| EmailSourceError::Read {
                path: dir.clone(),
                source,
            })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| EmailSourceError::Read {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                warn!(path = %path.display(), "skipping unreadable entry");
                continue;
            };
            if file_type.is_dir() {
                if entry.file_name() != LINKS_DIR_NAME {
                    pending.push(path);
                }
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
            {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Parses one archived email: header block, blank line, body.
///
/// Without a recognizable header block the whole text is the body. The date
/// comes from the `Date:` header (RFC 2822 or `YYYY-MM-DD`), else `today`.
#[must_use]
pub fn parse_email(raw: &str, today: NaiveDate) -> EmailRecord {
    let mut subject = String::new();
    let mut sender = String::new();
    let mut date = None;
    let mut saw_header = false;
    let mut body_start = 0;

    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if saw_header {
                body_start += line.len();
            }
            break;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            break;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "subject" => subject = value.to_string(),
            "from" => sender = value.to_string(),
            "date" => date = parse_header_date(value),
            _ => break,
        }
        saw_header = true;
        body_start += line.len();
    }

    let body_markdown = if saw_header { &raw[body_start..] } else { raw };

    EmailRecord {
        date: date.unwrap_or(today),
        sender,
        subject,
        body_markdown: body_markdown.to_string(),
        source: None,
    }
}

fn parse_header_date(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

/// Finds the nearest `YYYY-MM-DD` directory among the path's ancestors.
fn date_from_path(path: &Path) -> Option<NaiveDate> {
    path.parent()?
        .components()
        .rev()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .find_map(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_parse_email_header_block() {
        let raw = "Subject: Weekly AI\nFrom: News <news@example.com>\nDate: Mon, 15 Jan 2024 08:30:00 +0000\n\n# Hello\n[Read](https://example.com)\n";
        let email = parse_email(raw, today());
        assert_eq!(email.subject, "Weekly AI");
        assert_eq!(email.sender, "News <news@example.com>");
        assert_eq!(email.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(email.body_markdown, "# Hello\n[Read](https://example.com)\n");
    }

    #[test]
    fn test_parse_email_without_headers_is_all_body() {
        let raw = "Just a body with https://example.com\n";
        let email = parse_email(raw, today());
        assert_eq!(email.body_markdown, raw);
        assert_eq!(email.date, today());
        assert!(email.subject.is_empty());
    }

    #[test]
    fn test_parse_email_unparseable_date_uses_today() {
        let email = parse_email("Subject: x\nDate: sometime\n\nbody", today());
        assert_eq!(email.date, today());
        assert_eq!(email.body_markdown, "body");
    }

    #[test]
    fn test_date_from_path() {
        let path = Path::new("/archive/2024-02-10/News/Issue 5.md");
        assert_eq!(
            date_from_path(path),
            Some(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
        );
        assert_eq!(date_from_path(Path::new("/archive/misc/a.md")), None);
    }

    #[tokio::test]
    async fn test_archive_source_walks_directories_and_skips_links() {
        let tmp = TempDir::new().unwrap();
        let sender_dir = tmp.path().join("2024-02-10").join("News");
        let links_dir = tmp.path().join("2024-02-10").join("links");
        std::fs::create_dir_all(&sender_dir).unwrap();
        std::fs::create_dir_all(&links_dir).unwrap();
        std::fs::write(
            sender_dir.join("b.md"),
            "Subject: B\nFrom: n\nDate: Tue, 01 Jan 2019 00:00:00 +0000\n\nbody b",
        )
        .unwrap();
        std::fs::write(sender_dir.join("a.md"), "Subject: A\n\nbody a").unwrap();
        std::fs::write(sender_dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(links_dir.join("Stub.md"), "# Stub\n\nURL: https://x.com/\n").unwrap();

        let source = MarkdownArchiveSource::new(vec![tmp.path().to_path_buf()]).with_today(today());
        let emails = source.emails().await.unwrap();

        let subjects: Vec<_> = emails.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["A", "B"]);
        // Folder date wins over the header date.
        assert!(emails
            .iter()
            .all(|e| e.date == NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()));
    }

    #[tokio::test]
    async fn test_archive_source_missing_input() {
        let tmp = TempDir::new().unwrap();
        let source = MarkdownArchiveSource::new(vec![tmp.path().join("missing.md")]);
        let err = source.emails().await.unwrap_err();
        assert!(matches!(err, EmailSourceError::NotFound { .. }));
    }
}
