//! Build outcomes as reported by the executor and as seen by the repair loop.

use serde::{Deserialize, Serialize};

/// How far an evaluation got before it failed.
///
/// Ordered: a failure in a later stage means the candidate made it further
/// through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The expression itself did not evaluate (parse, type or attribute errors).
    Evaluation,
    /// The expression evaluated but realising the source attribute failed.
    Fetch,
    /// The full derivation was built and a build phase failed.
    Build,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureStage::Evaluation => "evaluation",
            FailureStage::Fetch => "fetch",
            FailureStage::Build => "build",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for FailureStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evaluation" | "eval" => Ok(FailureStage::Evaluation),
            "fetch" | "src" => Ok(FailureStage::Fetch),
            "build" => Ok(FailureStage::Build),
            other => Err(format!("unknown failure stage: {other}")),
        }
    }
}

/// Unclassified failure text captured by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFailure {
    pub stage: FailureStage,
    pub log: String,
}

impl RawFailure {
    pub fn new(stage: FailureStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            log: log.into(),
        }
    }
}

/// What the build executor reports for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub success: bool,
    pub failure: Option<RawFailure>,
}

impl BuildReport {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            failure: None,
        }
    }

    pub fn failed(stage: FailureStage, log: impl Into<String>) -> Self {
        Self {
            success: false,
            failure: Some(RawFailure::new(stage, log)),
        }
    }
}

/// Closed set of failure kinds the repair loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The candidate text is malformed; cheap to retry.
    EvalError,
    /// A fixed-output hash does not match; mechanically fixable.
    HashMismatch,
    /// A genuine build failure; needs a progress judgment.
    BuildError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::EvalError => "EVAL_ERROR",
            ErrorKind::HashMismatch => "HASH_MISMATCH",
            ErrorKind::BuildError => "BUILD_ERROR",
        };
        f.write_str(s)
    }
}

/// A classified build failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: FailureStage,
}

/// Result of evaluating one candidate.
///
/// `error` is present iff `success` is false; the constructors are the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    success: bool,
    error: Option<BuildError>,
}

impl BuildResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: BuildError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }
}
