//! Collaborator traits consumed by the packaging pipeline.
//!
//! These define the seams between the repair core and the outside world:
//! - `ProjectDataProvider`: project page text and release metadata
//! - `TemplateProvider`: starting-point recipes
//! - `BuildExecutor`: evaluates one candidate with the build tool
//! - `CorrectionStrategy` / `CorrectionSession`: the code-generation oracle
//! - `HashFixStrategy`: mechanical placeholder-hash replacement
//! - `ProgressJudge`: same-stage log comparison back end
//! - `SourceLocator`: where the fetched project source can be browsed
//! - `Reporter`: fire-and-forget user messaging
//!
//! In-memory fakes for all of them live in [`crate::fakes`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{BuildError, BuildReport, Result};
use crate::progress::{LogComparison, ProgressVerdict};

// ---------------------------------------------------------------------------
// Project data
// ---------------------------------------------------------------------------

/// Latest release (or tag) of a project, when one could be found.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub tag: String,
    pub name: Option<String>,
    pub published_at: Option<String>,
    pub tarball_url: Option<String>,
}

/// Everything known about a project before the first candidate is drafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub url: String,
    pub page_text: String,
    pub release: Option<ReleaseMetadata>,
}

#[async_trait]
pub trait ProjectDataProvider: Send + Sync {
    /// Fetch page text and release metadata. Fails with `PackagingError::Fetch`.
    async fn fetch(&self, url: &str) -> Result<ProjectData>;
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Identifier of a recipe template (e.g. `rust`, `python`, `generic`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub text: String,
    /// Free-form hints shipped alongside the template.
    pub notes: Option<String>,
}

#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Pick the template best matching the project page.
    async fn select(&self, page_text: &str) -> Result<TemplateId>;

    /// Load a template by id.
    async fn load(&self, id: &TemplateId) -> Result<Template>;
}

// ---------------------------------------------------------------------------
// Build executor
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Evaluate one candidate. An `Err` means the executor itself could not
    /// run; a failing build is reported inside the `BuildReport`.
    async fn evaluate(&self, candidate_text: &str) -> Result<BuildReport>;
}

// ---------------------------------------------------------------------------
// Correction oracle
// ---------------------------------------------------------------------------

/// Project context shared by every correction session of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorrectionContext {
    pub project_url: String,
    pub page_text: String,
    pub release: Option<ReleaseMetadata>,
    pub template_notes: Option<String>,
}

impl CorrectionContext {
    pub fn from_project(project: &ProjectData, template: &Template) -> Self {
        Self {
            project_url: project.url.clone(),
            page_text: project.page_text.clone(),
            release: project.release.clone(),
            template_notes: template.notes.clone(),
        }
    }
}

/// What a new correction session starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionRequest {
    pub context: CorrectionContext,
    pub candidate_text: String,
    pub error: BuildError,
}

/// Next input to a running correction session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Produce the first correction for the request the session was opened with.
    Start,
    /// The last candidate failed again with this error.
    Retry(BuildError),
    /// Adopt this externally patched text as the latest candidate.
    Patch(String),
}

/// A resumable correction conversation.
///
/// All conversation state lives in the session; each `advance` returns the
/// next candidate text to evaluate.
#[async_trait]
pub trait CorrectionSession: Send {
    async fn advance(&mut self, input: SessionInput) -> Result<String>;
}

#[async_trait]
pub trait CorrectionStrategy: Send + Sync {
    /// Draft the initial candidate from a template.
    async fn draft(&self, context: &CorrectionContext, template: &Template) -> Result<String>;

    /// Open a fresh correction session for a failing candidate.
    fn open(&self, request: CorrectionRequest) -> Box<dyn CorrectionSession>;
}

// ---------------------------------------------------------------------------
// Hash fixing and progress judgment
// ---------------------------------------------------------------------------

#[async_trait]
pub trait HashFixStrategy: Send + Sync {
    /// Return `candidate_text` with at most one placeholder hash replaced.
    async fn fix(&self, candidate_text: &str, error_text: &str) -> Result<String>;
}

#[async_trait]
pub trait ProgressJudge: Send + Sync {
    async fn judge(&self, comparison: &LogComparison) -> Result<ProgressVerdict>;
}

// ---------------------------------------------------------------------------
// Project source
// ---------------------------------------------------------------------------

/// Location of the unpacked project source, once a build has fetched it.
pub trait SourceLocator: Send + Sync {
    fn source_dir(&self) -> Option<PathBuf>;
}

/// A fixed checkout given up front.
impl SourceLocator for PathBuf {
    fn source_dir(&self) -> Option<PathBuf> {
        Some(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// User-facing narration sink. Calls never fail.
pub trait Reporter: Send + Sync {
    fn message(&self, text: &str);
    fn progress(&self, text: &str);
    fn error(&self, text: &str);
}
