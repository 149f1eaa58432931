//! The repair loop as an explicit state machine.
//!
//! [`RepairController::step`] performs exactly one transition;
//! [`RepairController::run`] drives it until `Success` or `Aborted`.
//! Two nested counters bound the loop: `inner` counts evaluation-type
//! failures (`EvalError`, `HashMismatch`) within one outer iteration and is
//! reset on acceptance; `outer` counts progress judgments.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::log::{RepairAction, RepairDecision, RepairLog, RepairOutcome};
use super::policy::RepairPolicy;
use crate::classifier::classify_report;
use crate::collaborators::{
    BuildExecutor, CorrectionContext, CorrectionRequest, CorrectionSession, CorrectionStrategy,
    HashFixStrategy, ProgressJudge, Reporter, SessionInput,
};
use crate::domain::{BuildError, ErrorKind, PackagingError, Result, Solution};
use crate::metrics::METRICS;
use crate::obs;
use crate::progress::{ProgressOracle, ProgressVerdict};
use crate::repository::CandidateRepository;

pub const INNER_BUDGET_EXHAUSTED: &str = "no progress within inner-attempt budget";
pub const OUTER_BUDGET_EXHAUSTED: &str = "outer iteration budget exhausted";

/// External collaborators the controller drives.
#[derive(Clone)]
pub struct RepairCollaborators {
    pub executor: Arc<dyn BuildExecutor>,
    pub corrector: Arc<dyn CorrectionStrategy>,
    pub hash_fixer: Arc<dyn HashFixStrategy>,
    pub judge: Arc<dyn ProgressJudge>,
    pub reporter: Arc<dyn Reporter>,
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    /// The initial candidate has not been evaluated yet.
    Init { candidate_text: String },
    /// Advance the correction session with `input` and evaluate the result.
    EvaluatingInner { input: SessionInput },
    /// The current candidate failed with a hash mismatch.
    FixingHash,
    /// The current candidate failed to build; ask the progress oracle.
    EvaluatingOuterProgress,
    Success,
    Aborted { reason: String },
}

impl RepairState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairState::Success | RepairState::Aborted { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RepairState::Init { .. } => "init",
            RepairState::EvaluatingInner { .. } => "evaluating_inner",
            RepairState::FixingHash => "fixing_hash",
            RepairState::EvaluatingOuterProgress => "evaluating_outer_progress",
            RepairState::Success => "success",
            RepairState::Aborted { .. } => "aborted",
        }
    }
}

pub struct RepairController {
    run_id: String,
    context: CorrectionContext,
    policy: RepairPolicy,
    executor: Arc<dyn BuildExecutor>,
    corrector: Arc<dyn CorrectionStrategy>,
    hash_fixer: Arc<dyn HashFixStrategy>,
    oracle: ProgressOracle,
    reporter: Arc<dyn Reporter>,
    state: RepairState,
    repository: Option<CandidateRepository>,
    session: Option<Box<dyn CorrectionSession>>,
    outer: u32,
    inner: u32,
    log: RepairLog,
}

impl RepairController {
    pub fn new(
        initial_candidate: impl Into<String>,
        context: CorrectionContext,
        policy: RepairPolicy,
        collaborators: RepairCollaborators,
    ) -> Self {
        let run_id = Uuid::new_v4().to_string();
        let log = RepairLog::new(&run_id, &context.project_url, policy.clone());
        let oracle = ProgressOracle::new(collaborators.judge, policy.comparison_max_lines);
        Self {
            run_id,
            context,
            policy,
            executor: collaborators.executor,
            corrector: collaborators.corrector,
            hash_fixer: collaborators.hash_fixer,
            oracle,
            reporter: collaborators.reporter,
            state: RepairState::Init {
                candidate_text: initial_candidate.into(),
            },
            repository: None,
            session: None,
            outer: 1,
            inner: 1,
            log,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> &RepairState {
        &self.state
    }

    pub fn outer_iteration(&self) -> u32 {
        self.outer
    }

    pub fn inner_iteration(&self) -> u32 {
        self.inner
    }

    /// `None` until the initial candidate has been evaluated.
    pub fn repository(&self) -> Option<&CandidateRepository> {
        self.repository.as_ref()
    }

    pub fn log(&self) -> &RepairLog {
        &self.log
    }

    pub fn into_log(self) -> RepairLog {
        self.log
    }

    /// Drive the state machine to a terminal state.
    ///
    /// Budget exhaustion is an `Ok(Aborted)`; an `Err` means a collaborator
    /// failed and the run could not continue.
    pub async fn run(&mut self) -> Result<RepairOutcome> {
        while !self.state.is_terminal() {
            self.step().await?;
        }
        let outcome = self
            .outcome()
            .ok_or_else(|| PackagingError::State("run ended in a non-terminal state".to_string()))?;
        self.log.finish(outcome.clone(), self.outer, self.inner);
        Ok(outcome)
    }

    /// Outcome of a finished run, `None` while still running.
    pub fn outcome(&self) -> Option<RepairOutcome> {
        match &self.state {
            RepairState::Success => self.repository.as_ref().map(|repo| RepairOutcome::Success {
                code: repo.best().candidate_text().to_string(),
            }),
            RepairState::Aborted { reason } => Some(RepairOutcome::Aborted {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    /// Perform one transition. On `Err` the state is left unchanged and
    /// only collaborator calls that completed are counted.
    pub async fn step(&mut self) -> Result<()> {
        let next = match self.state.clone() {
            RepairState::Init { candidate_text } => self.evaluate_initial(candidate_text).await?,
            RepairState::EvaluatingInner { input } => self.evaluate_inner(input).await?,
            RepairState::FixingHash => self.fix_hash().await?,
            RepairState::EvaluatingOuterProgress => self.judge_progress().await?,
            terminal => terminal,
        };
        debug!(
            from = self.state.name(),
            to = next.name(),
            outer = self.outer,
            inner = self.inner,
            "repair transition"
        );
        self.state = next;
        Ok(())
    }

    async fn evaluate_initial(&mut self, candidate_text: String) -> Result<RepairState> {
        self.reporter.progress("Evaluating initial candidate");
        let solution = self.evaluate(candidate_text).await?;
        let error = solution.error().cloned();
        self.repository = Some(CandidateRepository::new(solution));

        match error {
            None => {
                self.record(None, None, RepairAction::Accept, "initial candidate built");
                METRICS.inc_accepted();
                self.reporter.progress("Initial candidate built");
                Ok(RepairState::Success)
            }
            Some(error) => self.after_failure(error, true),
        }
    }

    async fn evaluate_inner(&mut self, input: SessionInput) -> Result<RepairState> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PackagingError::State("no open correction session".to_string()))?;
        let is_correction = !matches!(input, SessionInput::Patch(_));
        let candidate_text = session.advance(input).await?;
        if is_correction {
            self.log.corrections += 1;
            METRICS.inc_corrections();
        }

        let solution = self.evaluate(candidate_text).await?;
        let error = solution.error().cloned();
        self.repo_mut()?.propose(solution);

        match error {
            None => {
                self.record(None, None, RepairAction::Accept, "candidate built");
                self.repo_mut()?.accept();
                METRICS.inc_accepted();
                let msg = format!("Candidate built in iteration {}", self.outer);
                self.reporter.progress(&msg);
                Ok(RepairState::Success)
            }
            Some(error) => self.after_failure(error, false),
        }
    }

    /// Dispatch on the kind of a fresh failure.
    fn after_failure(&mut self, error: BuildError, initial: bool) -> Result<RepairState> {
        let kind = error.kind;
        match kind {
            ErrorKind::EvalError | ErrorKind::HashMismatch => {
                self.inner += 1;
                let msg = format!(
                    "Build iteration {}: {} (attempt {}/{})",
                    self.outer, kind, self.inner, self.policy.max_inner_attempts
                );
                self.reporter.progress(&msg);
                if self.inner > self.policy.max_inner_attempts {
                    return Ok(self.abort(INNER_BUDGET_EXHAUSTED));
                }
                if kind == ErrorKind::HashMismatch {
                    self.record(
                        Some(kind),
                        None,
                        RepairAction::FixHash,
                        "placeholder hash needs replacing",
                    );
                    return Ok(RepairState::FixingHash);
                }
                self.record(
                    Some(kind),
                    None,
                    RepairAction::Correct,
                    "candidate does not evaluate",
                );
                if self.session.is_none() {
                    self.open_session_from_current()?;
                    Ok(RepairState::EvaluatingInner {
                        input: SessionInput::Start,
                    })
                } else {
                    Ok(RepairState::EvaluatingInner {
                        input: SessionInput::Retry(error),
                    })
                }
            }
            ErrorKind::BuildError if initial => {
                let msg = format!("Build iteration {}: {}", self.outer, kind);
                self.reporter.progress(&msg);
                self.record(
                    Some(kind),
                    None,
                    RepairAction::Correct,
                    "initial candidate failed to build",
                );
                self.open_session_from_current()?;
                Ok(RepairState::EvaluatingInner {
                    input: SessionInput::Start,
                })
            }
            ErrorKind::BuildError => {
                let msg = format!("Build iteration {}: {}, judging progress", self.outer, kind);
                self.reporter.progress(&msg);
                self.record(
                    Some(kind),
                    None,
                    RepairAction::Judge,
                    "build failure needs a progress judgment",
                );
                Ok(RepairState::EvaluatingOuterProgress)
            }
        }
    }

    async fn fix_hash(&mut self) -> Result<RepairState> {
        let current = self.repo()?.current().clone();
        let error = current.error().cloned().ok_or_else(|| {
            PackagingError::State("hash fix requested for a successful candidate".to_string())
        })?;

        let fixed = match self
            .hash_fixer
            .fix(current.candidate_text(), &error.message)
            .await
        {
            Ok(patch) => Ok(patch),
            Err(PackagingError::HashFix(reason)) => Err(reason),
            Err(err) => return Err(err),
        };
        let opened = self.session.is_none();
        if opened {
            self.open_session(current.candidate_text().to_string(), error.clone());
        }

        match fixed {
            Ok(patch) => {
                self.log.hash_fixes += 1;
                METRICS.inc_hash_fixes();
                info!(run_id = %self.run_id, "hash fix applied");
                Ok(RepairState::EvaluatingInner {
                    input: SessionInput::Patch(patch),
                })
            }
            // The session sees the mismatch report and rewrites the hash itself.
            Err(reason) => {
                warn!(run_id = %self.run_id, %reason, "mechanical hash fix failed");
                let msg = format!("Hash could not be patched ({reason}), asking for a correction");
                self.reporter.progress(&msg);
                self.record(
                    Some(ErrorKind::HashMismatch),
                    None,
                    RepairAction::Correct,
                    "hash fix failed, correcting through the session",
                );
                let input = if opened {
                    SessionInput::Start
                } else {
                    SessionInput::Retry(error)
                };
                Ok(RepairState::EvaluatingInner { input })
            }
        }
    }

    async fn judge_progress(&mut self) -> Result<RepairState> {
        let (best_error, candidate_error) = {
            let repo = self.repo()?;
            let missing = || PackagingError::State("progress judged without a failure".to_string());
            (
                repo.best().error().cloned().ok_or_else(missing)?,
                repo.current().error().cloned().ok_or_else(missing)?,
            )
        };

        let verdict = self.oracle.compare(&best_error, &candidate_error).await?;
        obs::emit_progress_verdict(&self.run_id, self.outer, &verdict.to_string());

        match verdict {
            ProgressVerdict::Progress => {
                let msg = format!("Build iteration {} made progress", self.outer);
                self.reporter.message(&msg);
                self.record(
                    Some(candidate_error.kind),
                    Some(verdict),
                    RepairAction::Accept,
                    "candidate got further than best",
                );
                self.repo_mut()?.accept();
                self.inner = 1;
                METRICS.inc_accepted();
            }
            ProgressVerdict::Regress => {
                let msg = format!(
                    "Build iteration {} did not make progress, rolling back",
                    self.outer
                );
                self.reporter.message(&msg);
                self.record(
                    Some(candidate_error.kind),
                    Some(verdict),
                    RepairAction::Rollback,
                    "candidate did not get further than best",
                );
                self.repo_mut()?.rollback();
                METRICS.inc_rolled_back();
            }
        }

        self.outer += 1;
        if self.outer > self.policy.max_outer_iterations {
            return Ok(self.abort(OUTER_BUDGET_EXHAUSTED));
        }

        let best = self.repo()?.best().clone();
        let error = best
            .error()
            .cloned()
            .ok_or_else(|| PackagingError::State("best solution has no error".to_string()))?;
        self.open_session(best.candidate_text().to_string(), error);
        Ok(RepairState::EvaluatingInner {
            input: SessionInput::Start,
        })
    }

    async fn evaluate(&mut self, candidate_text: String) -> Result<Solution> {
        let report = self.executor.evaluate(&candidate_text).await?;
        let result = classify_report(report);
        self.log.evaluations += 1;
        METRICS.inc_evaluations();

        let label = result
            .error()
            .map(|e| e.kind.to_string())
            .unwrap_or_else(|| "SUCCESS".to_string());
        obs::emit_candidate_evaluated(&self.run_id, self.outer, self.inner, &label);
        Ok(Solution::new(candidate_text, result))
    }

    fn open_session_from_current(&mut self) -> Result<()> {
        let current = self.repo()?.current().clone();
        let error = current.error().cloned().ok_or_else(|| {
            PackagingError::State("correction requested for a successful candidate".to_string())
        })?;
        self.open_session(current.candidate_text().to_string(), error);
        Ok(())
    }

    fn open_session(&mut self, candidate_text: String, error: BuildError) {
        debug!(run_id = %self.run_id, kind = %error.kind, "opening correction session");
        self.session = Some(self.corrector.open(CorrectionRequest {
            context: self.context.clone(),
            candidate_text,
            error,
        }));
    }

    fn abort(&mut self, reason: &str) -> RepairState {
        warn!(
            run_id = %self.run_id,
            outer = self.outer,
            inner = self.inner,
            reason,
            "repair aborted"
        );
        self.record(None, None, RepairAction::Abort, reason);
        RepairState::Aborted {
            reason: reason.to_string(),
        }
    }

    fn record(
        &mut self,
        kind: Option<ErrorKind>,
        verdict: Option<ProgressVerdict>,
        action: RepairAction,
        rationale: &str,
    ) {
        self.log.record(RepairDecision {
            outer: self.outer,
            inner: self.inner,
            kind,
            verdict,
            action,
            rationale: rationale.to_string(),
        });
    }

    fn repo(&self) -> Result<&CandidateRepository> {
        self.repository
            .as_ref()
            .ok_or_else(|| PackagingError::State("no candidate evaluated yet".to_string()))
    }

    fn repo_mut(&mut self) -> Result<&mut CandidateRepository> {
        self.repository
            .as_mut()
            .ok_or_else(|| PackagingError::State("no candidate evaluated yet".to_string()))
    }
}
