//! Error types for nix-env-manager

use nixpack_core::PackagingError;
use thiserror::Error;

/// Errors raised while driving Nix.
///
/// A candidate that fails to evaluate or build is not an error here; it is
/// reported as a failing `BuildReport`. These variants mean the executor
/// itself could not do its job.
#[derive(Error, Debug)]
pub enum NixError {
    /// Nix command not found
    #[error("Nix is not installed or not in PATH")]
    NixNotFound,

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// `nix log` could not produce the log of a failed build, usually because
    /// a dependency failed before the derivation itself was attempted.
    #[error("failed to retrieve build log for {drv}: {stderr}")]
    LogUnavailable { drv: String, stderr: String },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("git error: {0}")]
    Git(String),

    #[error("cannot fix hash: {0}")]
    HashFix(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<NixError> for PackagingError {
    fn from(err: NixError) -> Self {
        match err {
            NixError::HashFix(msg) => PackagingError::HashFix(msg),
            NixError::Io(io) => PackagingError::Io(io),
            other => PackagingError::Executor(other.to_string()),
        }
    }
}
