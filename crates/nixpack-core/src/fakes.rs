//! In-memory fakes for the collaborator traits (testing only).
//!
//! Every fake records what it was asked so tests can assert on the exact
//! sequence of calls the repair loop made.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::*;
use crate::domain::{BuildReport, PackagingError, Result};
use crate::progress::{LogComparison, ProgressVerdict};

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Returns pre-scripted reports in order; errors once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    reports: Mutex<VecDeque<BuildReport>>,
    evaluated: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(reports: impl IntoIterator<Item = BuildReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into_iter().collect()),
            evaluated: Mutex::new(Vec::new()),
        }
    }

    /// Candidate texts evaluated so far, in order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.evaluated.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
    async fn evaluate(&self, candidate_text: &str) -> Result<BuildReport> {
        self.evaluated
            .lock()
            .unwrap()
            .push(candidate_text.to_string());
        self.reports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PackagingError::Executor("executor script exhausted".to_string()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedCorrectionStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CorrectionLog {
    requests: Vec<CorrectionRequest>,
    inputs: Vec<SessionInput>,
    produced: usize,
}

/// Drafts a fixed initial candidate and hands out sessions that answer with
/// `candidate-<n>` (numbered across all sessions). Patches are adopted as-is.
#[derive(Debug, Clone)]
pub struct ScriptedCorrectionStrategy {
    draft: String,
    log: Arc<Mutex<CorrectionLog>>,
}

impl ScriptedCorrectionStrategy {
    pub fn new(draft: impl Into<String>) -> Self {
        Self {
            draft: draft.into(),
            log: Arc::new(Mutex::new(CorrectionLog::default())),
        }
    }

    /// Requests each session was opened with.
    pub fn requests(&self) -> Vec<CorrectionRequest> {
        self.log.lock().unwrap().requests.clone()
    }

    /// Every input passed to `advance`, across sessions.
    pub fn inputs(&self) -> Vec<SessionInput> {
        self.log.lock().unwrap().inputs.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.log.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl CorrectionStrategy for ScriptedCorrectionStrategy {
    async fn draft(&self, _context: &CorrectionContext, _template: &Template) -> Result<String> {
        Ok(self.draft.clone())
    }

    fn open(&self, request: CorrectionRequest) -> Box<dyn CorrectionSession> {
        self.log.lock().unwrap().requests.push(request);
        Box::new(ScriptedSession {
            log: Arc::clone(&self.log),
        })
    }
}

struct ScriptedSession {
    log: Arc<Mutex<CorrectionLog>>,
}

#[async_trait]
impl CorrectionSession for ScriptedSession {
    async fn advance(&mut self, input: SessionInput) -> Result<String> {
        let mut log = self.log.lock().unwrap();
        log.inputs.push(input.clone());
        match input {
            SessionInput::Patch(text) => Ok(text),
            SessionInput::Start | SessionInput::Retry(_) => {
                log.produced += 1;
                Ok(format!("candidate-{}", log.produced))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CountingHashFixer
// ---------------------------------------------------------------------------

/// Appends a marker comment to the candidate and counts invocations.
/// A refusing fixer fails every call with `PackagingError::HashFix`.
#[derive(Debug, Default)]
pub struct CountingHashFixer {
    calls: Mutex<Vec<(String, String)>>,
    refusal: Option<String>,
}

impl CountingHashFixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            refusal: Some(reason.into()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(candidate_text, error_text)` of every call.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HashFixStrategy for CountingHashFixer {
    async fn fix(&self, candidate_text: &str, error_text: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((candidate_text.to_string(), error_text.to_string()));
        match &self.refusal {
            Some(reason) => Err(PackagingError::HashFix(reason.clone())),
            None => Ok(format!("{candidate_text}\n# hash fixed")),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedJudge
// ---------------------------------------------------------------------------

/// Returns scripted verdicts in order, then `Regress`.
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    verdicts: Mutex<VecDeque<ProgressVerdict>>,
    seen: Mutex<Vec<LogComparison>>,
}

impl ScriptedJudge {
    pub fn new(verdicts: impl IntoIterator<Item = ProgressVerdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_comparison(&self) -> Option<LogComparison> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProgressJudge for ScriptedJudge {
    async fn judge(&self, comparison: &LogComparison) -> Result<ProgressVerdict> {
        self.seen.lock().unwrap().push(comparison.clone());
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProgressVerdict::Regress))
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Message,
    Progress,
    Error,
}

/// Keeps every line it is given.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<(ReportLevel, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(ReportLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count(&self, level: ReportLevel) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    fn push(&self, level: ReportLevel, text: &str) {
        self.lines.lock().unwrap().push((level, text.to_string()));
    }
}

impl Reporter for RecordingReporter {
    fn message(&self, text: &str) {
        self.push(ReportLevel::Message, text);
    }

    fn progress(&self, text: &str) {
        self.push(ReportLevel::Progress, text);
    }

    fn error(&self, text: &str) {
        self.push(ReportLevel::Error, text);
    }
}

// ---------------------------------------------------------------------------
// Project data and templates
// ---------------------------------------------------------------------------

/// Serves one fixed project, or fails every fetch.
#[derive(Debug, Clone)]
pub struct StaticProjects {
    project: Option<ProjectData>,
}

impl StaticProjects {
    pub fn new(project: ProjectData) -> Self {
        Self {
            project: Some(project),
        }
    }

    pub fn unreachable() -> Self {
        Self { project: None }
    }
}

#[async_trait]
impl ProjectDataProvider for StaticProjects {
    async fn fetch(&self, url: &str) -> Result<ProjectData> {
        match &self.project {
            Some(project) => Ok(ProjectData {
                url: url.to_string(),
                ..project.clone()
            }),
            None => Err(PackagingError::Fetch(format!("{url}: unreachable"))),
        }
    }
}

/// Always selects and loads the same template.
#[derive(Debug, Clone)]
pub struct StaticTemplates {
    template: Template,
}

impl StaticTemplates {
    pub fn new(template: Template) -> Self {
        Self { template }
    }
}

#[async_trait]
impl TemplateProvider for StaticTemplates {
    async fn select(&self, _page_text: &str) -> Result<TemplateId> {
        Ok(self.template.id.clone())
    }

    async fn load(&self, id: &TemplateId) -> Result<Template> {
        if *id == self.template.id {
            Ok(self.template.clone())
        } else {
            Err(PackagingError::Template(format!("unknown template {id}")))
        }
    }
}
