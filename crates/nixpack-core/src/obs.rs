//! Structured lifecycle events for packaging runs.
//!
//! - `run_span` for instrumenting a run's future with its id
//! - `emit_*` functions for run start/finish, candidate evaluation and
//!   progress verdicts
//!
//! Events are emitted at `info!` level; enable JSON output with `--json`.

use tracing::info;

/// Span tagging everything inside a run with its id.
///
/// ```ignore
/// controller.run().instrument(run_span(controller.run_id())).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("nixpack.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, project_url: &str) {
    info!(event = "run.started", run_id = %run_id, project_url = %project_url);
}

/// Emit event: run finished with duration, evaluation count and outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, evaluations: u32, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        evaluations = evaluations,
        success = success,
    );
}

/// Emit event: one candidate evaluated. `result` is `SUCCESS` or the error kind.
pub fn emit_candidate_evaluated(run_id: &str, outer: u32, inner: u32, result: &str) {
    info!(
        event = "repair.evaluated",
        run_id = %run_id,
        outer = outer,
        inner = inner,
        result = %result,
    );
}

pub fn emit_progress_verdict(run_id: &str, outer: u32, verdict: &str) {
    info!(event = "repair.verdict", run_id = %run_id, outer = outer, verdict = %verdict);
}

/// Emit event: the repair log could not be written (warning level).
pub fn emit_log_write_error(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.log_write_error", run_id = %run_id, error = %error);
}
