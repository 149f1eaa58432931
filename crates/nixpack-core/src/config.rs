//! Run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::repair::RepairPolicy;

/// Directories and bounds for one packaging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Where `<id>.nix` templates and their `.notes` live.
    pub template_dir: PathBuf,
    /// Scratch directory the build executor evaluates candidates in.
    pub work_dir: PathBuf,
    /// Accepted recipes go to `<output_dir>/<pname>/package.nix`; `None` skips saving.
    pub output_dir: Option<PathBuf>,
    /// Repair logs go to `<log_dir>/<run_id>/repair.json`; `None` skips them.
    pub log_dir: Option<PathBuf>,
    pub policy: RepairPolicy,
}

impl PackagingConfig {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            work_dir: std::env::temp_dir().join("nixpack"),
            output_dir: None,
            log_dir: None,
            policy: RepairPolicy::default(),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }
}
