//! nixpack - iterative Nix package recipe generation
//!
//! The `nixpack` command drafts a `package.nix` for a project, builds it
//! with Nix and repairs it until it builds or the attempt budgets run out.
//!
//! ## Commands
//!
//! - `package`: run the full pipeline for a project URL
//! - `classify`: print the error kind of a build log
//! - `compare`: compare two failing build logs
//! - `fix-hash`: apply a hash mismatch report to a recipe
//! - `env`: report the Nix installation

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use model_oracle::{
    ModelConfig, ModelCorrectionStrategy, ModelProgressJudge, OpenAiChatClient,
    ProjectSourceTools,
};
use nix_env_manager::{nix_version, replace_hash, NixBuildExecutor, PlaceholderHashFixer};
use nixpack_core::{
    classify, package_project, telemetry::level_for, BuildError, ErrorKind, FailureStage,
    LineCountJudge, LogComparison, PackagingConfig, PipelineCollaborators, ProgressJudge,
    ProgressOracle, ProgressVerdict, RawFailure, RepairCollaborators, RepairPolicy,
    SourceLocator, TerminalReporter,
};
use project_sources::{DirectoryTemplates, GithubProjectProvider};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Parser)]
#[command(name = "nixpack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate a building package.nix for a project", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum JudgeKind {
    /// Ask the model
    Model,
    /// Ask on the terminal
    Ask,
    /// Offline line-count heuristic
    Lines,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a project until its recipe builds
    Package {
        /// Project URL (GitHub)
        url: String,

        /// Directory holding `<id>.nix` templates and `<id>.notes`
        #[arg(long, env = "NIXPACK_TEMPLATE_DIR", default_value = "templates")]
        template_dir: PathBuf,

        /// Flake skeleton directory (default: built-in flake)
        #[arg(long)]
        flake: Option<PathBuf>,

        /// Parent directory for the per-run build workspace
        #[arg(long, env = "NIXPACK_WORK_DIR")]
        work_dir: Option<PathBuf>,

        /// Where to save the finished `<pname>/package.nix`
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Where to write the repair log
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Who decides whether a failing build got further
        #[arg(long, value_enum, default_value = "model")]
        judge: JudgeKind,

        /// Evaluations allowed without reaching a build failure
        #[arg(long, default_value = "10")]
        max_inner: u32,

        /// Progress judgments allowed per run
        #[arg(long, default_value = "15")]
        max_outer: u32,

        /// Kill a single nix command after this many seconds
        #[arg(long)]
        build_timeout: Option<u64>,

        /// Local checkout the model may read (default: the fetched `src`)
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Do not let the model read the project source
        #[arg(long, conflicts_with = "source_dir")]
        no_source_tools: bool,
    },

    /// Print the error kind of a build log
    Classify {
        /// Stage the failure happened in (evaluation, fetch, build)
        #[arg(short, long, default_value = "build")]
        stage: FailureStage,

        /// Log file
        log: PathBuf,
    },

    /// Compare two failing build logs of the same stage
    Compare {
        /// Log of the best attempt so far
        best: PathBuf,

        /// Log of the new attempt
        candidate: PathBuf,

        /// Decide on the terminal instead of with the line-count heuristic
        #[arg(long)]
        ask: bool,

        /// Lines of each log to keep
        #[arg(long, default_value = "1000")]
        max_lines: usize,
    },

    /// Apply a hash mismatch report to a recipe and print the result
    FixHash {
        /// Recipe to patch
        recipe: PathBuf,

        /// File holding the hash mismatch error
        error_log: PathBuf,
    },

    /// Show Nix and model environment info
    Env,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    nixpack_core::init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Package {
            url,
            template_dir,
            flake,
            work_dir,
            output_dir,
            log_dir,
            judge,
            max_inner,
            max_outer,
            build_timeout,
            source_dir,
            no_source_tools,
        } => {
            let mut config = PackagingConfig::new(template_dir).with_policy(RepairPolicy {
                max_inner_attempts: max_inner,
                max_outer_iterations: max_outer,
                ..RepairPolicy::default()
            });
            if let Some(dir) = work_dir {
                config = config.with_work_dir(dir);
            }
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            if let Some(dir) = log_dir {
                config = config.with_log_dir(dir);
            }
            cmd_package(
                &url,
                &config,
                flake.as_deref(),
                judge,
                build_timeout.map(Duration::from_secs),
                SourceAccess::from_flags(source_dir, no_source_tools),
            )
            .await
        }
        Commands::Classify { stage, log } => cmd_classify(stage, &log).map(|_| ExitCode::SUCCESS),
        Commands::Compare {
            best,
            candidate,
            ask,
            max_lines,
        } => cmd_compare(&best, &candidate, ask, max_lines)
            .await
            .map(|_| ExitCode::SUCCESS),
        Commands::FixHash { recipe, error_log } => {
            cmd_fix_hash(&recipe, &error_log).map(|_| ExitCode::SUCCESS)
        }
        Commands::Env => cmd_env().await.map(|_| ExitCode::SUCCESS),
    }
}

/// Which project source the correction model may browse.
enum SourceAccess {
    /// The `src` realised by the latest successful source build.
    Fetched,
    Checkout(PathBuf),
    Disabled,
}

impl SourceAccess {
    fn from_flags(source_dir: Option<PathBuf>, disabled: bool) -> Self {
        match (source_dir, disabled) {
            (_, true) => Self::Disabled,
            (Some(dir), false) => Self::Checkout(dir),
            (None, false) => Self::Fetched,
        }
    }
}

async fn cmd_package(
    url: &str,
    config: &PackagingConfig,
    flake: Option<&Path>,
    judge_kind: JudgeKind,
    build_timeout: Option<Duration>,
    source_access: SourceAccess,
) -> Result<ExitCode> {
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("Failed to create work directory {:?}", config.work_dir))?;
    let workspace_dir = tempfile::Builder::new()
        .prefix("run-")
        .tempdir_in(&config.work_dir)
        .context("Failed to create build workspace")?;

    let executor = Arc::new(
        NixBuildExecutor::create(workspace_dir.path(), flake, build_timeout)
            .await
            .context("Failed to set up the flake workspace")?,
    );

    let model = ModelConfig::from_env();
    info!(endpoint = %model.endpoint, model = %model.model, "using model");
    let chat = Arc::new(OpenAiChatClient::new(model).context("Failed to create model client")?);

    let mut corrector = ModelCorrectionStrategy::new(chat.clone());
    let locator: Option<Arc<dyn SourceLocator>> = match source_access {
        SourceAccess::Fetched => Some(executor.clone()),
        SourceAccess::Checkout(dir) => Some(Arc::new(dir)),
        SourceAccess::Disabled => None,
    };
    if let Some(locator) = locator {
        corrector = corrector.with_source_tools(ProjectSourceTools::new(locator));
    }

    let judge: Arc<dyn ProgressJudge> = match judge_kind {
        JudgeKind::Model => Arc::new(ModelProgressJudge::new(chat.clone())),
        JudgeKind::Ask => Arc::new(InteractiveJudge::stdin()),
        JudgeKind::Lines => Arc::new(LineCountJudge),
    };

    let collaborators = PipelineCollaborators {
        projects: Arc::new(GithubProjectProvider::new().context("Failed to create HTTP client")?),
        templates: Arc::new(DirectoryTemplates::new(&config.template_dir)),
        repair: RepairCollaborators {
            executor,
            corrector: Arc::new(corrector),
            hash_fixer: Arc::new(PlaceholderHashFixer),
            judge,
            reporter: Arc::new(TerminalReporter::stdout()),
        },
    };

    let report = package_project(url, config, &collaborators)
        .await
        .with_context(|| format!("Failed to package {url}"))?;

    if let Some(path) = &report.log_path {
        println!("Repair log: {}", path.display());
    }
    if report.outcome.is_success() && report.save_error.is_none() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn cmd_classify(stage: FailureStage, log: &Path) -> Result<()> {
    let text = std::fs::read_to_string(log)
        .with_context(|| format!("Failed to read log {:?}", log))?;
    let kind = classify(&RawFailure::new(stage, text));
    println!("{kind}");
    Ok(())
}

async fn cmd_compare(best: &Path, candidate: &Path, ask: bool, max_lines: usize) -> Result<()> {
    let best_log = std::fs::read_to_string(best)
        .with_context(|| format!("Failed to read log {:?}", best))?;
    let candidate_log = std::fs::read_to_string(candidate)
        .with_context(|| format!("Failed to read log {:?}", candidate))?;

    let comparison = LogComparison::prepare(&best_log, &candidate_log, max_lines);
    println!("Best attempt:      {} lines", comparison.best_lines);
    println!("Candidate attempt: {} lines", comparison.candidate_lines);
    println!("Logs diverge at line {}", comparison.divergence_line);

    let judge: Arc<dyn ProgressJudge> = if ask {
        Arc::new(InteractiveJudge::stdin())
    } else {
        Arc::new(LineCountJudge)
    };
    let oracle = ProgressOracle::new(judge, max_lines);
    let as_error = |message: String| BuildError {
        kind: ErrorKind::BuildError,
        message,
        stage: FailureStage::Build,
    };
    let verdict = oracle
        .compare(&as_error(best_log), &as_error(candidate_log))
        .await?;
    println!("Verdict: {verdict}");
    Ok(())
}

fn cmd_fix_hash(recipe: &Path, error_log: &Path) -> Result<()> {
    let text = std::fs::read_to_string(recipe)
        .with_context(|| format!("Failed to read recipe {:?}", recipe))?;
    let error = std::fs::read_to_string(error_log)
        .with_context(|| format!("Failed to read error log {:?}", error_log))?;
    let patched = replace_hash(&text, &error)?;
    print!("{patched}");
    Ok(())
}

async fn cmd_env() -> Result<()> {
    println!("nixpack {}", nixpack_core::VERSION);
    println!();

    match nix_version().await {
        Ok(version) => println!("Nix installed: yes ({version})"),
        Err(e) => println!("Nix installed: no ({e})"),
    }

    let model = ModelConfig::from_env();
    println!();
    println!("Model:");
    println!("  NIXPACK_MODEL_ENDPOINT: {}", model.endpoint);
    println!("  NIXPACK_MODEL: {}", model.model);
    println!(
        "  NIXPACK_API_KEY: {}",
        if model.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    Ok(())
}

/// Parse a terminal answer to the progress question.
fn parse_answer(line: &str) -> Option<ProgressVerdict> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "progress" => Some(ProgressVerdict::Progress),
        "r" | "regress" => Some(ProgressVerdict::Regress),
        _ => None,
    }
}

/// Lets a human decide whether the candidate got further.
struct InteractiveJudge {
    input: Mutex<Box<dyn AsyncBufRead + Unpin + Send>>,
}

impl InteractiveJudge {
    fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Box::new(reader)),
        }
    }
}

#[async_trait]
impl ProgressJudge for InteractiveJudge {
    async fn judge(&self, comparison: &LogComparison) -> nixpack_core::Result<ProgressVerdict> {
        eprintln!("--- best attempt ({} lines) ---", comparison.best_lines);
        eprintln!("{}", comparison.best_excerpt);
        eprintln!("--- new attempt ({} lines) ---", comparison.candidate_lines);
        eprintln!("{}", comparison.candidate_excerpt);
        eprintln!("Logs diverge at line {}.", comparison.divergence_line);

        let mut input = self.input.lock().await;
        loop {
            eprint!("Did the new attempt get further? [p]rogress/[r]egress: ");
            let mut line = String::new();
            if input.read_line(&mut line).await? == 0 {
                // EOF counts as a tie.
                return Ok(ProgressVerdict::Regress);
            }
            if let Some(verdict) = parse_answer(&line) {
                return Ok(verdict);
            }
        }
    }
}
