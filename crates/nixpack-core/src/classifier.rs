//! Failure taxonomy for evaluated candidates.

use crate::domain::{BuildError, BuildReport, BuildResult, ErrorKind, FailureStage, RawFailure};

const HASH_MISMATCH_MARKERS: &[&str] = &[
    "hash mismatch in fixed-output derivation",
    "hash mismatch",
    "expected sha256",
];

/// Whether the log reports a fixed-output hash mismatch.
pub fn is_hash_mismatch(log: &str) -> bool {
    let lower = log.to_lowercase();
    if HASH_MISMATCH_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    lower.contains("specified:") && lower.contains("got:")
}

/// Classify a failure. First match wins:
/// evaluation-stage failures, then hash mismatches, then everything else.
pub fn classify(failure: &RawFailure) -> ErrorKind {
    if failure.stage == FailureStage::Evaluation {
        return ErrorKind::EvalError;
    }
    if is_hash_mismatch(&failure.log) {
        return ErrorKind::HashMismatch;
    }
    ErrorKind::BuildError
}

/// Turn an executor report into a classified [`BuildResult`].
///
/// A report claiming failure without any captured output is treated as an
/// evaluation failure with an empty message.
pub fn classify_report(report: BuildReport) -> BuildResult {
    if report.success {
        return BuildResult::success();
    }
    let failure = report
        .failure
        .unwrap_or_else(|| RawFailure::new(FailureStage::Evaluation, ""));
    let kind = classify(&failure);
    BuildResult::failure(BuildError {
        kind,
        message: failure.log,
        stage: failure.stage,
    })
}
