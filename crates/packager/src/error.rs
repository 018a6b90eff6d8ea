//! Error types for the packager crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while packaging a source tree
#[derive(Error, Debug)]
pub enum Error {
    /// The requested archive format (or destination extension) is not supported
    #[error("unsupported archive format: {0} (expected zip, tar or tar.gz)")]
    InvalidFormat(String),

    /// Reading the source tree or writing the archive failed
    #[error("packaging failed at {}: {source}", .path.display())]
    PackagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exclude pattern could not be compiled
    #[error("invalid exclude pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

impl Error {
    /// Wrap an IO error with the path being read or written
    pub(crate) fn packaging(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::PackagingFailed {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Result type for packager operations
pub type Result<T> = std::result::Result<T, Error>;
