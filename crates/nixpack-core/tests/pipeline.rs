use std::sync::Arc;

use nixpack_core::fakes::{
    CountingHashFixer, RecordingReporter, ReportLevel, ScriptedCorrectionStrategy,
    ScriptedExecutor, ScriptedJudge, StaticProjects, StaticTemplates,
};
use nixpack_core::{
    package_project, read_repair_log, BuildReport, FailureStage, PackagingConfig, PackagingError,
    PipelineCollaborators, ProjectData, ReleaseMetadata, RepairCollaborators, RepairOutcome,
    RepairPolicy, ResultPersister, Template, TemplateId,
};
use tempfile::tempdir;

const RECIPE: &str = r#"{ lib, stdenv, fetchFromGitHub }:

stdenv.mkDerivation rec {
  pname = "hello";
  version = "2.12.1";
  src = fetchFromGitHub {
    owner = "example";
    repo = "hello";
    rev = "v${version}";
    hash = lib.fakeHash;
  };
}
"#;

struct Fixture {
    executor: Arc<ScriptedExecutor>,
    reporter: Arc<RecordingReporter>,
    collaborators: PipelineCollaborators,
}

fn fixture(draft: &str, reports: Vec<BuildReport>, projects: StaticProjects) -> Fixture {
    let executor = Arc::new(ScriptedExecutor::new(reports));
    let reporter = Arc::new(RecordingReporter::new());
    let template = Template {
        id: TemplateId::new("generic"),
        text: "{ stdenv }: stdenv.mkDerivation { }".to_string(),
        notes: None,
    };
    let collaborators = PipelineCollaborators {
        projects: Arc::new(projects),
        templates: Arc::new(StaticTemplates::new(template)),
        repair: RepairCollaborators {
            executor: executor.clone(),
            corrector: Arc::new(ScriptedCorrectionStrategy::new(draft)),
            hash_fixer: Arc::new(CountingHashFixer::new()),
            judge: Arc::new(ScriptedJudge::new(vec![])),
            reporter: reporter.clone(),
        },
    };
    Fixture {
        executor,
        reporter,
        collaborators,
    }
}

fn hello_project() -> StaticProjects {
    StaticProjects::new(ProjectData {
        url: String::new(),
        page_text: "hello: a friendly greeter. Build with make.".to_string(),
        release: Some(ReleaseMetadata {
            tag: "v2.12.1".to_string(),
            ..ReleaseMetadata::default()
        }),
    })
}

#[tokio::test]
async fn successful_run_saves_recipe_and_repair_log() {
    let out = tempdir().unwrap();
    let logs = tempdir().unwrap();
    let f = fixture(RECIPE, vec![BuildReport::succeeded()], hello_project());
    let config = PackagingConfig::new("templates")
        .with_output_dir(out.path())
        .with_log_dir(logs.path());

    let report = package_project("https://github.com/example/hello", &config, &f.collaborators)
        .await
        .unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(report.template, TemplateId::new("generic"));

    let saved = report.saved_to.expect("recipe saved");
    assert_eq!(saved, out.path().join("hello").join("package.nix"));
    assert_eq!(std::fs::read_to_string(&saved).unwrap(), RECIPE);

    let provenance = ResultPersister::new(out.path()).provenance("hello").unwrap();
    assert_eq!(provenance.pname, "hello");
    assert_eq!(provenance.metadata.project_url, "https://github.com/example/hello");
    assert_eq!(provenance.metadata.template.as_deref(), Some("generic"));
    assert_eq!(provenance.recipe_sha256.len(), 64);

    let log = read_repair_log(&report.log.run_id, logs.path()).unwrap();
    assert_eq!(log.evaluations, 1);
    assert_eq!(log.outcome, Some(report.outcome.clone()));
    assert!(report.log_path.is_some());

    let finals: Vec<_> = f
        .reporter
        .lines()
        .into_iter()
        .filter(|(_, text)| text.starts_with("Package built"))
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(f.reporter.count(ReportLevel::Error), 0);
}

#[tokio::test]
async fn fetch_failure_aborts_before_any_evaluation() {
    let f = fixture(RECIPE, vec![BuildReport::succeeded()], StaticProjects::unreachable());
    let config = PackagingConfig::new("templates");

    let err = package_project("https://github.com/example/gone", &config, &f.collaborators)
        .await
        .unwrap_err();

    assert!(matches!(err, PackagingError::Fetch(_)));
    assert_eq!(f.executor.calls(), 0);
}

#[tokio::test]
async fn aborted_run_is_reported_once_and_not_saved() {
    let out = tempdir().unwrap();
    let eval =
        |n: u32| BuildReport::failed(FailureStage::Evaluation, format!("error: bad attr {n}"));
    let f = fixture(RECIPE, vec![eval(1), eval(2)], hello_project());
    let config = PackagingConfig::new("templates")
        .with_output_dir(out.path())
        .with_policy(RepairPolicy {
            max_inner_attempts: 2,
            ..RepairPolicy::default()
        });

    let report = package_project("https://github.com/example/hello", &config, &f.collaborators)
        .await
        .unwrap();

    assert!(matches!(report.outcome, RepairOutcome::Aborted { .. }));
    assert!(report.saved_to.is_none());
    assert!(!out.path().join("hello").exists());
    assert_eq!(f.reporter.count(ReportLevel::Error), 1);
}

#[tokio::test]
async fn final_report_carries_the_built_code() {
    let draft = "UNIQUE_RECIPE_BODY pname = \"hello\";";
    let f = fixture(draft, vec![BuildReport::succeeded()], hello_project());
    let config = PackagingConfig::new("templates");

    let report = package_project("https://github.com/example/hello", &config, &f.collaborators)
        .await
        .unwrap();

    assert!(report.saved_to.is_none());
    let finals: Vec<_> = f
        .reporter
        .lines()
        .into_iter()
        .filter(|(_, text)| text.starts_with("Package built"))
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].0, ReportLevel::Message);
    assert!(finals[0].1.contains("Final package code"));
    assert!(finals[0].1.contains(draft));
}

#[tokio::test]
async fn unsaveable_recipe_keeps_success_and_writes_repair_log() {
    let out = tempdir().unwrap();
    let logs = tempdir().unwrap();
    let recipe = "{ stdenv }: stdenv.mkDerivation { name = \"hello-1.0\"; }";
    let f = fixture(recipe, vec![BuildReport::succeeded()], hello_project());
    let config = PackagingConfig::new("templates")
        .with_output_dir(out.path())
        .with_log_dir(logs.path());

    let report = package_project("https://github.com/example/hello", &config, &f.collaborators)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        RepairOutcome::Success {
            code: recipe.to_string()
        }
    );
    assert!(report.saved_to.is_none());
    let reason = report.save_error.expect("save failure recorded");
    assert!(reason.contains("pname"));

    let log = read_repair_log(&report.log.run_id, logs.path()).unwrap();
    assert_eq!(log.outcome, Some(report.outcome.clone()));

    let lines = f.reporter.lines();
    assert_eq!(f.reporter.count(ReportLevel::Error), 1);
    assert!(lines
        .iter()
        .any(|(level, text)| *level == ReportLevel::Error && text.contains("Could not save")));
    let last = &lines.last().expect("final outcome reported").1;
    assert!(last.starts_with("Package built"));
    assert!(last.contains(recipe));
}
