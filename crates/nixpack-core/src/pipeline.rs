//! End-to-end packaging: fetch, pick a template, draft, repair, persist.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{warn, Instrument};

use crate::collaborators::{
    CorrectionContext, ProjectDataProvider, TemplateId, TemplateProvider,
};
use crate::config::PackagingConfig;
use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::persist::{RecipeMetadata, ResultPersister};
use crate::repair::{
    write_repair_log, RepairCollaborators, RepairController, RepairLog, RepairOutcome,
};

/// Everything the pipeline needs besides configuration.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub projects: Arc<dyn ProjectDataProvider>,
    pub templates: Arc<dyn TemplateProvider>,
    pub repair: RepairCollaborators,
}

/// Result of a completed (successful or aborted) run.
#[derive(Debug, Clone)]
pub struct PackagingReport {
    pub template: TemplateId,
    pub outcome: RepairOutcome,
    pub log: RepairLog,
    /// Path of the saved `package.nix`, when an output directory was configured.
    pub saved_to: Option<PathBuf>,
    /// Why saving a successful recipe failed (naming or I/O).
    pub save_error: Option<String>,
    /// Path of the persisted repair log, when a log directory was configured.
    pub log_path: Option<PathBuf>,
}

/// Package the project at `url`.
///
/// Boundary failures before or during repair (fetch, template, collaborator
/// errors) are returned as `Err`; an exhausted budget is an `Ok` report with
/// an `Aborted` outcome. A recipe that built but could not be saved keeps
/// its `Success` outcome and carries the failure in `save_error`. The final
/// outcome, with the code on success, is reported exactly once.
pub async fn package_project(
    url: &str,
    config: &PackagingConfig,
    collaborators: &PipelineCollaborators,
) -> Result<PackagingReport> {
    let reporter = collaborators.repair.reporter.clone();

    reporter.message(&format!("Fetching project data for {url}"));
    let project = collaborators.projects.fetch(url).await?;
    if let Some(release) = &project.release {
        reporter.message(&format!("Latest release: {}", release.tag));
    }

    let template_id = collaborators.templates.select(&project.page_text).await?;
    reporter.message(&format!("Selected template: {template_id}"));
    let template = collaborators.templates.load(&template_id).await?;

    let context = CorrectionContext::from_project(&project, &template);
    let initial = collaborators.repair.corrector.draft(&context, &template).await?;

    let mut controller = RepairController::new(
        initial,
        context,
        config.policy.clone(),
        collaborators.repair.clone(),
    );
    let run_id = controller.run_id().to_string();
    obs::emit_run_started(&run_id, url);
    let started = Instant::now();

    let run = controller.run().instrument(obs::run_span(&run_id)).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    let outcome = match run {
        Ok(outcome) => outcome,
        Err(err) => {
            obs::emit_run_finished(&run_id, duration_ms, controller.log().evaluations, false);
            METRICS.flush();
            return Err(err);
        }
    };
    let log = controller.into_log();

    let mut save_error = None;
    let saved_to = match (&outcome, &config.output_dir) {
        (RepairOutcome::Success { code }, Some(dir)) => {
            let metadata = RecipeMetadata {
                project_url: url.to_string(),
                template: Some(template_id.to_string()),
                run_id: Some(run_id.clone()),
                outer_iterations: log.outer_iterations,
                evaluations: log.evaluations,
            };
            match ResultPersister::new(dir).save(code, &metadata) {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(run_id = %run_id, error = %err, "failed to save recipe");
                    reporter.error(&format!("Could not save the recipe: {err}"));
                    save_error = Some(err.to_string());
                    None
                }
            }
        }
        _ => None,
    };

    let log_path = match &config.log_dir {
        Some(dir) => match write_repair_log(&log, dir) {
            Ok(path) => Some(path),
            Err(err) => {
                obs::emit_log_write_error(&run_id, &err);
                None
            }
        },
        None => None,
    };

    match &outcome {
        RepairOutcome::Success { code } => {
            let saved = match &saved_to {
                Some(path) => format!(", saved to {}", path.display()),
                None => String::new(),
            };
            reporter.message(&format!(
                "Package built after {} iterations{saved}\n\nFinal package code:\n{code}",
                log.outer_iterations
            ));
        }
        RepairOutcome::Aborted { reason } => {
            reporter.error(&format!("Packaging aborted: {reason}"));
        }
    }

    obs::emit_run_finished(&run_id, duration_ms, log.evaluations, outcome.is_success());
    METRICS.flush();

    Ok(PackagingReport {
        template: template_id,
        outcome,
        log,
        saved_to,
        save_error,
        log_path,
    })
}
