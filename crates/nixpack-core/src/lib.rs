//! nixpack core library
//!
//! The iterative repair loop that turns a drafted `package.nix` into one
//! that builds: error classification, progress judgment, candidate
//! tracking, the bounded state machine and result persistence. The outside
//! world (project data, templates, Nix, the model) is reached through the
//! traits in [`collaborators`].

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod digest;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod persist;
pub mod pipeline;
pub mod placeholder;
pub mod progress;
pub mod repair;
pub mod reporter;
pub mod repository;
pub mod telemetry;

pub use classifier::{classify, classify_report, is_hash_mismatch};
pub use collaborators::{
    BuildExecutor, CorrectionContext, CorrectionRequest, CorrectionSession, CorrectionStrategy,
    HashFixStrategy, ProgressJudge, ProjectData, ProjectDataProvider, ReleaseMetadata, Reporter,
    SessionInput, SourceLocator, Template, TemplateId, TemplateProvider,
};
pub use config::PackagingConfig;
pub use domain::{
    BuildError, BuildReport, BuildResult, ErrorKind, FailureStage, PackagingError, RawFailure,
    Result, Solution,
};
pub use persist::{package_name, Provenance, RecipeMetadata, ResultPersister};
pub use pipeline::{package_project, PackagingReport, PipelineCollaborators};
pub use progress::{LineCountJudge, LogComparison, ProgressOracle, ProgressVerdict};
pub use repair::{
    read_repair_log, write_repair_log, RepairAction, RepairCollaborators, RepairController,
    RepairDecision, RepairLog, RepairOutcome, RepairPolicy, RepairState,
};
pub use reporter::{TerminalReporter, TracingReporter};
pub use repository::CandidateRepository;

pub use metrics::METRICS;
pub use obs::{emit_run_finished, emit_run_started, run_span};
pub use telemetry::init_tracing;

/// nixpack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
