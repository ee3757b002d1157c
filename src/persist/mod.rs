//! Deduplicated, collision-safe persistence of resolved links.
//!
//! Each link becomes one small Markdown stub in the output directory:
//!
//! ```text
//! # <title>
//!
//! URL: <final url>
//! Kind: <webpage|pdf>
//! Original URL: <raw url>     (only when it differs)
//! arXiv: <id>                 (only for arXiv links)
//! ```
//!
//! Writing the same link again produces byte-identical content, and an existing
//! file with identical content is reused rather than shadowed by a `_1` copy.

mod error;
mod filename;
mod normalize;

pub use error::PersistError;
pub use filename::{MAX_TITLE_CHARS, derive_title, sanitize_title};
pub use normalize::{DedupSet, normalize_url};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::resolver::TransformedLink;
use filename::{MAX_NAME_SUFFIX, candidate_path};

/// A stub file written (or reused) for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedLinkFile {
    /// Display title (before filename sanitizing).
    pub title: String,
    /// Path of the stub file.
    pub path: PathBuf,
    /// Final URL recorded in the stub.
    pub url: String,
    /// True when an identical existing file was reused.
    pub reused: bool,
}

/// Outcome of persisting one link.
#[derive(Debug)]
pub enum PersistOutcome {
    /// The stub was written or an identical one already existed.
    Persisted(PersistedLinkFile),
    /// The normalized URL was already persisted in this run.
    Duplicate {
        /// Final URL of the duplicate.
        url: String,
    },
    /// The stub could not be written.
    Failed {
        /// URL as found in the email.
        original: String,
        /// Final URL of the link.
        url: String,
        /// What went wrong.
        error: PersistError,
    },
}

/// Writes link stubs into one output directory.
#[derive(Debug, Clone)]
pub struct LinkPersister {
    output_dir: PathBuf,
}

impl LinkPersister {
    /// Creates a persister for `output_dir` (created on first use).
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory stubs are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persists links in order, consulting and updating the run's dedup set.
    ///
    /// Failures are reported per link and do not stop the batch. A link whose
    /// write failed is not added to `seen`. Persisted and duplicate links have
    /// their email URL recorded with [`DedupSet::insert_source`].
    #[instrument(skip_all, fields(dir = %self.output_dir.display(), count = links.len()))]
    pub async fn persist(
        &self,
        links: Vec<TransformedLink>,
        seen: &mut DedupSet,
    ) -> Vec<PersistOutcome> {
        let mut outcomes = Vec::with_capacity(links.len());
        let mut dir_ready = false;

        for link in links {
            if seen.contains(&link.final_url) {
                debug!(url = %link.final_url, "duplicate link, skipping");
                seen.insert_source(&link.resolved.original.url);
                outcomes.push(PersistOutcome::Duplicate {
                    url: link.final_url,
                });
                continue;
            }

            if !dir_ready {
                if let Err(source) = fs::create_dir_all(&self.output_dir).await {
                    warn!(error = %source, "cannot create output directory");
                    outcomes.push(PersistOutcome::Failed {
                        original: link.resolved.original.url,
                        url: link.final_url,
                        error: PersistError::create_dir(&self.output_dir, source),
                    });
                    continue;
                }
                dir_ready = true;
            }

            match self.write_stub(&link).await {
                Ok(file) => {
                    seen.insert(&link.final_url);
                    seen.insert_source(&link.resolved.original.url);
                    info!(path = %file.path.display(), url = %file.url, reused = file.reused, "persisted link");
                    outcomes.push(PersistOutcome::Persisted(file));
                }
                Err(error) => {
                    warn!(url = %link.final_url, error = %error, "failed to persist link");
                    outcomes.push(PersistOutcome::Failed {
                        original: link.resolved.original.url,
                        url: link.final_url,
                        error,
                    });
                }
            }
        }

        outcomes
    }

    async fn write_stub(&self, link: &TransformedLink) -> Result<PersistedLinkFile, PersistError> {
        let title = derive_title(link);
        let stem = sanitize_title(&title);
        let content = render_stub(&title, link);

        for suffix in 0..=MAX_NAME_SUFFIX {
            let path = candidate_path(&self.output_dir, &stem, suffix);
            match create_new(&path, &content).await {
                Ok(()) => {
                    return Ok(PersistedLinkFile {
                        title,
                        path,
                        url: link.final_url.clone(),
                        reused: false,
                    });
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    if fs::read_to_string(&path)
                        .await
                        .is_ok_and(|existing| existing == content)
                    {
                        return Ok(PersistedLinkFile {
                            title,
                            path,
                            url: link.final_url.clone(),
                            reused: true,
                        });
                    }
                }
                Err(error) => return Err(PersistError::write(path, error)),
            }
        }

        Err(PersistError::NameExhausted {
            title: stem,
            dir: self.output_dir.clone(),
        })
    }
}

/// Creates `path` exclusively and writes `content`, removing the file again
/// if the write does not complete.
async fn create_new(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = write_contents(&mut file, content).await;
    drop(file);
    discard_partial(path, written).await
}

async fn write_contents(file: &mut fs::File, content: &str) -> std::io::Result<()> {
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Passes `written` through, deleting the truncated file at `path` on error.
async fn discard_partial(path: &Path, written: std::io::Result<()>) -> std::io::Result<()> {
    let Err(error) = written else {
        return Ok(());
    };
    if let Err(remove_error) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %remove_error, "failed to remove partial stub");
    }
    Err(error)
}

/// Renders the Markdown stub for a link.
#[must_use]
pub fn render_stub(title: &str, link: &TransformedLink) -> String {
    let mut out = format!(
        "# {title}\n\nURL: {}\nKind: {}\n",
        link.final_url, link.content_kind
    );
    let original = &link.resolved.original.url;
    if original != &link.final_url {
        out.push_str(&format!("Original URL: {original}\n"));
    }
    if let Some(id) = &link.arxiv_id {
        out.push_str(&format!("arXiv: {id}\n"));
    }
    out
}
