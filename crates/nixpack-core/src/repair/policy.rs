//! Retry bounds for one packaging run.

use serde::{Deserialize, Serialize};

/// Bounded repair policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPolicy {
    /// Evaluation-type failures tolerated within one outer iteration.
    pub max_inner_attempts: u32,
    /// Progress judgments tolerated before the run gives up.
    pub max_outer_iterations: u32,
    /// Lines of each log handed to the progress judge.
    pub comparison_max_lines: usize,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_inner_attempts: 10,
            max_outer_iterations: 15,
            comparison_max_lines: 1000,
        }
    }
}
