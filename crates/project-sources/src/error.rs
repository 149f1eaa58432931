//! Error types for project-sources

use nixpack_core::PackagingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("not a GitHub repository URL: {0}")]
    InvalidUrl(String),

    #[error("GET {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("template error: {0}")]
    Template(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<SourceError> for PackagingError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Template(msg) => PackagingError::Template(msg),
            SourceError::Io(io) => PackagingError::Io(io),
            other => PackagingError::Fetch(other.to_string()),
        }
    }
}
