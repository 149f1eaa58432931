//! Progress judgment between two failing attempts.
//!
//! The deterministic part (stage precedence, log alignment, tie detection)
//! lives here; the actual call on same-stage traces is delegated to a
//! [`ProgressJudge`] so the back end (model, human, heuristic) can be swapped
//! without touching the repair loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collaborators::ProgressJudge;
use crate::domain::{BuildError, Result};

/// Outcome of comparing a candidate against the best-known-good attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressVerdict {
    Progress,
    Regress,
}

impl std::fmt::Display for ProgressVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressVerdict::Progress => f.write_str("PROGRESS"),
            ProgressVerdict::Regress => f.write_str("REGRESS"),
        }
    }
}

/// Aligned view of two failure logs, ready for a judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogComparison {
    /// Total lines in the best-known-good log.
    pub best_lines: usize,
    /// Total lines in the candidate log.
    pub candidate_lines: usize,
    /// 1-based line where the logs stop agreeing.
    pub divergence_line: usize,
    /// Numbered tail of the best log, starting at or after the divergence.
    pub best_excerpt: String,
    /// Numbered tail of the candidate log, starting at or after the divergence.
    pub candidate_excerpt: String,
}

impl LogComparison {
    /// Align two logs and cut each down to at most `max_lines` numbered lines.
    ///
    /// The divergence point is the first line of `best` (within the shorter
    /// log's length) that appears nowhere in `candidate`, which tolerates
    /// reordered output from parallel builds.
    pub fn prepare(best: &str, candidate: &str, max_lines: usize) -> Self {
        let best_list: Vec<&str> = best.lines().collect();
        let candidate_list: Vec<&str> = candidate.lines().collect();
        let candidate_set: std::collections::HashSet<&str> =
            candidate_list.iter().copied().collect();

        let shared = best_list.len().min(candidate_list.len());
        let divergence_line = best_list
            .iter()
            .take(shared)
            .position(|line| !candidate_set.contains(line))
            .map(|i| i + 1)
            .unwrap_or(shared + 1);

        let best_start = start_line(best_list.len(), max_lines, divergence_line);
        let candidate_start = start_line(candidate_list.len(), max_lines, divergence_line);

        Self {
            best_lines: best_list.len(),
            candidate_lines: candidate_list.len(),
            divergence_line,
            best_excerpt: number_lines(&best_list, best_start),
            candidate_excerpt: number_lines(&candidate_list, candidate_start),
        }
    }
}

fn start_line(total: usize, max_lines: usize, divergence_line: usize) -> usize {
    total
        .saturating_sub(max_lines)
        .max(divergence_line.saturating_sub(1))
        .min(total)
}

fn number_lines(lines: &[&str], start: usize) -> String {
    lines[start..]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:4}: {}", start + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compares failure traces and asks the configured judge when needed.
pub struct ProgressOracle {
    judge: Arc<dyn ProgressJudge>,
    max_lines: usize,
}

impl ProgressOracle {
    pub fn new(judge: Arc<dyn ProgressJudge>, max_lines: usize) -> Self {
        Self { judge, max_lines }
    }

    /// Decide whether `candidate` got further than `best`. Ties are `Regress`.
    pub async fn compare(
        &self,
        best: &BuildError,
        candidate: &BuildError,
    ) -> Result<ProgressVerdict> {
        if candidate.stage > best.stage {
            debug!(best = %best.stage, candidate = %candidate.stage, "candidate reached a later stage");
            return Ok(ProgressVerdict::Progress);
        }
        if candidate.stage < best.stage {
            debug!(best = %best.stage, candidate = %candidate.stage, "candidate fell back to an earlier stage");
            return Ok(ProgressVerdict::Regress);
        }
        if best.message == candidate.message {
            return Ok(ProgressVerdict::Regress);
        }

        let comparison = LogComparison::prepare(&best.message, &candidate.message, self.max_lines);
        info!(
            best_lines = comparison.best_lines,
            candidate_lines = comparison.candidate_lines,
            divergence_line = comparison.divergence_line,
            "comparing build logs"
        );
        self.judge.judge(&comparison).await
    }
}

/// Offline fallback judge: progress only when the candidate log is strictly
/// longer and shares its opening with the best log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCountJudge;

#[async_trait]
impl ProgressJudge for LineCountJudge {
    async fn judge(&self, comparison: &LogComparison) -> Result<ProgressVerdict> {
        if comparison.candidate_lines > comparison.best_lines && comparison.divergence_line > 1 {
            Ok(ProgressVerdict::Progress)
        } else {
            Ok(ProgressVerdict::Regress)
        }
    }
}
