//! Two-pass Nix build executor.
//!
//! Each candidate is evaluated twice, like a human packager would: first
//! the `src` attribute (does the fetcher work and is its hash right?), then
//! the whole package. Each pass instantiates the derivation with
//! `nix path-info --derivation` and realises it with `nix build <drv>^*`.
//! Build failures that are not hash mismatches are replaced by the full
//! `nix log` of the failed derivation.
//!
//! The output path of the last successful source pass is remembered so the
//! correction oracle can browse the project source.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nixpack_core::{BuildExecutor, BuildReport, FailureStage, RawFailure, SourceLocator};
use tracing::{debug, info};

use crate::error::NixError;
use crate::flake::{BuildTarget, FlakeWorkspace};
use crate::runner::{CommandOutput, CommandRunner, ProcessRunner};
use crate::Result;

const HASH_MISMATCH_MARKER: &str = "hash mismatch in fixed-output derivation";

/// Stage recorded when building `target` fails.
pub fn failure_stage(target: BuildTarget) -> FailureStage {
    match target {
        BuildTarget::Source => FailureStage::Fetch,
        BuildTarget::Package => FailureStage::Build,
    }
}

/// Interpret `nix path-info --derivation`: the derivation path, or the
/// failure to report.
pub fn interpret_instantiate(
    target: BuildTarget,
    output: &CommandOutput,
) -> std::result::Result<String, RawFailure> {
    if output.success {
        return match output.stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) {
            Some(drv) => Ok(drv.to_string()),
            None => Err(RawFailure::new(
                FailureStage::Evaluation,
                "nix path-info returned no derivation",
            )),
        };
    }
    // Import-from-derivation can surface a fetch hash mismatch while evaluating.
    if output.stderr.contains(HASH_MISMATCH_MARKER) {
        return Err(RawFailure::new(failure_stage(target), &output.stderr));
    }
    Err(RawFailure::new(FailureStage::Evaluation, &output.stderr))
}

/// What to do after `nix build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Built,
    Failed(RawFailure),
    /// The build failed for another reason; fetch the derivation's log.
    NeedsLog,
}

pub fn interpret_build(target: BuildTarget, output: &CommandOutput) -> BuildStep {
    if output.success {
        BuildStep::Built
    } else if output.stderr.contains(HASH_MISMATCH_MARKER) {
        BuildStep::Failed(RawFailure::new(failure_stage(target), &output.stderr))
    } else {
        BuildStep::NeedsLog
    }
}

/// Interpret `nix log`. A missing log usually means a dependency failed
/// before the derivation was attempted, which the repair loop cannot act on.
pub fn interpret_log(
    target: BuildTarget,
    drv: &str,
    build: &CommandOutput,
    log: &CommandOutput,
) -> Result<RawFailure> {
    if !log.success {
        return Err(NixError::LogUnavailable {
            drv: drv.to_string(),
            stderr: format!("{}\n\nbuild output:\n{}", log.stderr.trim(), build.stderr.trim()),
        });
    }
    Ok(RawFailure::new(failure_stage(target), &log.stdout))
}

pub struct NixBuildExecutor<R = ProcessRunner> {
    workspace: FlakeWorkspace,
    runner: R,
    source_dir: Mutex<Option<PathBuf>>,
}

impl NixBuildExecutor<ProcessRunner> {
    /// Initialise a flake workspace in `work_dir` and build with real processes.
    pub async fn create(
        work_dir: &Path,
        skeleton: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let runner = match timeout {
            Some(limit) => ProcessRunner::new().with_timeout(limit),
            None => ProcessRunner::new(),
        };
        let workspace = FlakeWorkspace::init(work_dir, skeleton, &runner).await?;
        Ok(Self::with_runner(workspace, runner))
    }
}

impl<R: CommandRunner> NixBuildExecutor<R> {
    pub fn with_runner(workspace: FlakeWorkspace, runner: R) -> Self {
        Self {
            workspace,
            runner,
            source_dir: Mutex::new(None),
        }
    }

    pub fn workspace(&self) -> &FlakeWorkspace {
        &self.workspace
    }

    /// Build one target of the current `package.nix`. `None` means it built.
    pub async fn build_target(&self, target: BuildTarget) -> Result<Option<RawFailure>> {
        let installable = self.workspace.installable(target);
        let instantiate = self.nix(&["path-info", "--derivation", &installable]).await?;
        let drv = match interpret_instantiate(target, &instantiate) {
            Ok(drv) => drv,
            Err(failure) => return Ok(Some(failure)),
        };

        let outputs = format!("{drv}^*");
        info!(drv = %drv, "building derivation outputs");
        let build = self
            .nix(&["build", &outputs, "--no-link", "--print-out-paths"])
            .await?;
        match interpret_build(target, &build) {
            BuildStep::Built => {
                if target == BuildTarget::Source {
                    self.remember_source(&build.stdout);
                }
                Ok(None)
            }
            BuildStep::Failed(failure) => Ok(Some(failure)),
            BuildStep::NeedsLog => {
                let log = self.nix(&["log", &outputs]).await?;
                interpret_log(target, &drv, &build, &log).map(Some)
            }
        }
    }

    fn remember_source(&self, stdout: &str) {
        let Some(path) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return;
        };
        debug!(path, "project source realised");
        if let Ok(mut slot) = self.source_dir.lock() {
            *slot = Some(PathBuf::from(path));
        }
    }

    async fn nix(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut full = vec![
            "--extra-experimental-features".to_string(),
            "nix-command flakes".to_string(),
        ];
        full.extend(args.iter().map(|a| a.to_string()));
        self.runner.run("nix", &full, Some(self.workspace.dir())).await
    }
}

#[async_trait]
impl<R: CommandRunner> BuildExecutor for NixBuildExecutor<R> {
    async fn evaluate(&self, candidate_text: &str) -> nixpack_core::Result<BuildReport> {
        self.workspace
            .write_candidate(candidate_text, &self.runner)
            .await?;

        for target in [BuildTarget::Source, BuildTarget::Package] {
            if let Some(failure) = self.build_target(target).await? {
                debug!(stage = %failure.stage, "candidate failed");
                return Ok(BuildReport {
                    success: false,
                    failure: Some(failure),
                });
            }
        }
        Ok(BuildReport::succeeded())
    }
}

impl<R: CommandRunner> SourceLocator for NixBuildExecutor<R> {
    fn source_dir(&self) -> Option<PathBuf> {
        self.source_dir.lock().ok().and_then(|slot| slot.clone())
    }
}
