//! Errors raised while writing link stub files.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to write one link's stub file. Reported per link; never aborts a batch.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The stub file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Every candidate filename for the title is taken by different content.
    #[error("no free filename for '{title}' in {dir}")]
    NameExhausted {
        /// Sanitized title.
        title: String,
        /// Output directory.
        dir: PathBuf,
    },
}

impl PersistError {
    /// Creates a directory creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
