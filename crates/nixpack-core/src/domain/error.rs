//! Error taxonomy for packaging runs.
//!
//! Build failures of a candidate are *not* errors: they are classified into
//! [`ErrorKind`](crate::domain::ErrorKind) and handled by the repair loop.
//! The variants here are boundary failures that end a run immediately.

/// Packaging run errors.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("failed to fetch project data: {0}")]
    Fetch(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("build executor failed: {0}")]
    Executor(String),

    #[error("correction oracle failed: {0}")]
    Oracle(String),

    #[error("hash fix failed: {0}")]
    HashFix(String),

    #[error("could not determine package name: {0}")]
    Naming(String),

    #[error("invalid repair state: {0}")]
    State(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for packaging operations.
pub type Result<T> = std::result::Result<T, PackagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packaging_error_display() {
        let err = PackagingError::Fetch("connection refused".to_string());
        assert!(err.to_string().contains("failed to fetch project data"));

        let err = PackagingError::Naming("no pname attribute".to_string());
        assert!(err.to_string().contains("package name"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = PackagingError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PackagingError = io.into();
        assert!(matches!(err, PackagingError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }
}
