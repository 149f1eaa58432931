//! Immutable candidate snapshots.

use super::build::{BuildError, BuildResult};

/// A candidate recipe together with the result of evaluating it.
///
/// Never mutated; a newer evaluation produces a new `Solution`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    candidate_text: String,
    build_result: BuildResult,
}

impl Solution {
    pub fn new(candidate_text: impl Into<String>, build_result: BuildResult) -> Self {
        Self {
            candidate_text: candidate_text.into(),
            build_result,
        }
    }

    pub fn candidate_text(&self) -> &str {
        &self.candidate_text
    }

    pub fn build_result(&self) -> &BuildResult {
        &self.build_result
    }

    pub fn is_success(&self) -> bool {
        self.build_result.is_success()
    }

    pub fn error(&self) -> Option<&BuildError> {
        self.build_result.error()
    }
}
