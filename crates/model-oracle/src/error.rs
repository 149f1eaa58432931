//! Error types for model-oracle

use nixpack_core::PackagingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("model configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("model request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Non-success HTTP status from the endpoint
    #[error("model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// The reply did not contain exactly one fenced nix block.
    #[error("expected exactly one ```nix code block in the reply, found {found}")]
    CodeBlock { found: usize },
}

impl From<OracleError> for PackagingError {
    fn from(err: OracleError) -> Self {
        PackagingError::Oracle(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_packaging_error() {
        let err: PackagingError = OracleError::CodeBlock { found: 2 }.into();
        assert!(matches!(err, PackagingError::Oracle(ref m) if m.contains("found 2")));
    }
}
