//! Auditable record of one repair run, with digest-verified persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::RepairPolicy;
use crate::digest::sha256_hex;
use crate::domain::{ErrorKind, PackagingError, Result};
use crate::progress::ProgressVerdict;

/// What the controller did in response to a classification or verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// Ask the correction session for another candidate.
    Correct,
    /// Patch a placeholder hash mechanically.
    FixHash,
    /// Hand the build failure to the progress oracle.
    Judge,
    Accept,
    Rollback,
    Abort,
}

/// One decision in the repair timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairDecision {
    pub outer: u32,
    pub inner: u32,
    pub kind: Option<ErrorKind>,
    pub verdict: Option<ProgressVerdict>,
    pub action: RepairAction,
    pub rationale: String,
}

/// Terminal result of the repair loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    Success { code: String },
    Aborted { reason: String },
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RepairOutcome::Success { .. })
    }
}

/// Full repair log for artifacts and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairLog {
    pub run_id: String,
    pub project_url: String,
    pub policy: RepairPolicy,
    pub decisions: Vec<RepairDecision>,
    pub evaluations: u32,
    pub corrections: u32,
    pub hash_fixes: u32,
    pub outer_iterations: u32,
    pub inner_iterations: u32,
    pub outcome: Option<RepairOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RepairLog {
    pub fn new(
        run_id: impl Into<String>,
        project_url: impl Into<String>,
        policy: RepairPolicy,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            project_url: project_url.into(),
            policy,
            decisions: Vec::new(),
            evaluations: 0,
            corrections: 0,
            hash_fixes: 0,
            outer_iterations: 1,
            inner_iterations: 1,
            outcome: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, decision: RepairDecision) {
        self.decisions.push(decision);
    }

    /// Decisions with the given action, in order.
    pub fn decisions_with(&self, action: RepairAction) -> impl Iterator<Item = &RepairDecision> {
        self.decisions.iter().filter(move |d| d.action == action)
    }

    pub fn finish(&mut self, outcome: RepairOutcome, outer: u32, inner: u32) {
        self.outer_iterations = outer;
        self.inner_iterations = inner;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }
}

/// Persist `<dir>/<run_id>/repair.json` and `<dir>/<run_id>/repair.digest`.
pub fn write_repair_log(log: &RepairLog, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&log.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let log_path = run_dir.join("repair.json");
    let json = serde_json::to_vec_pretty(log)?;
    std::fs::write(&log_path, &json)?;
    std::fs::write(run_dir.join("repair.digest"), sha256_hex(&json).as_bytes())?;

    Ok(log_path)
}

/// Read `<dir>/<run_id>/repair.json`, rejecting it if the digest disagrees.
pub fn read_repair_log(run_id: &str, dir: &Path) -> Result<RepairLog> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join("repair.json"))?;
    let expected = std::fs::read_to_string(run_dir.join("repair.digest"))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(PackagingError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
