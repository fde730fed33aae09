//! Processor is the part of the grader that deals with a single submission:
//! it unpacks the archive, runs configured suites one after another and
//! produces the report.
//!
//! A run goes through `Init -> Extracting -> Running(i) -> Finalized`.
//! Suites run strictly in declaration order. Suite-level problems never
//! escape this crate: they are folded into the report.

mod persist;

pub use persist::{ReportDestination, ReportFormat};

use anyhow::Context;
use archive_loader::{ExtractionPolicy, Extractor, DEFAULT_ACCEPTED};
use grader_apis::{GradingReport, SuiteConfig, SuiteResult};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use suite_loader::{Catalog, GraderConfig, SuiteRegistry};
use suite_runner::SuiteRunner;
use tracing::Instrument;

/// Single grading request
pub struct Request {
    pub submission_id: String,
    /// Submission archive. When absent, the work directory is graded as is.
    pub archive: Option<PathBuf>,
    /// Directory the submission is extracted into; suites run inside it
    pub work_path: PathBuf,
}

/// Overall response state
#[derive(Debug)]
pub enum GradingOutcome {
    /// Report is complete and was persisted.
    Success,
    /// Run was aborted or the report could not be written.
    /// The report (if any) explains what happened but is not a real grade.
    Fault { error: anyhow::Error },
}

impl GradingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GradingOutcome::Success)
    }
}

/// Configuration, resolved suites and the runner, shared between runs
#[derive(Clone)]
pub struct Clients {
    pub config: Arc<GraderConfig>,
    pub registry: Arc<SuiteRegistry>,
    pub runner: Arc<SuiteRunner>,
}

impl Clients {
    /// Resolves suites of `config` against `catalog`.
    pub fn new(config: GraderConfig, catalog: &Catalog, runner: SuiteRunner) -> Clients {
        let registry = SuiteRegistry::resolve(&config.suites, &config.base_dir, catalog);
        Clients {
            config: Arc::new(config),
            registry: Arc::new(registry),
            runner: Arc::new(runner),
        }
    }
}

/// Settings are global rather than come from a request.
#[derive(Clone)]
pub struct Settings {
    pub destination: ReportDestination,
}

/// Result of [`grade`]
#[derive(Debug)]
pub struct Graded {
    pub report: GradingReport,
    /// Where the report was written, if it was
    pub report_path: Option<PathBuf>,
    pub outcome: GradingOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Extracting,
    Running(usize),
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => f.write_str("init"),
            Stage::Extracting => f.write_str("extracting"),
            Stage::Running(i) => write!(f, "running({})", i),
            Stage::Finalized => f.write_str("finalized"),
        }
    }
}

fn enter(stage: Stage) {
    tracing::debug!(%stage, "entering stage");
}

/// The main function: grades the submission and persists the report once.
#[tracing::instrument(skip(req, clients, settings), fields(submission_id = %req.submission_id))]
pub async fn grade(req: Request, clients: &Clients, settings: &Settings) -> Graded {
    let (report, fault) = evaluate(&req, clients).await;
    match persist::persist(&report, &settings.destination).await {
        Ok(path) => Graded {
            report,
            report_path: Some(path),
            outcome: match fault {
                None => GradingOutcome::Success,
                Some(error) => GradingOutcome::Fault { error },
            },
        },
        Err(err) => {
            let error = match fault {
                None => err.context("failed to persist report"),
                Some(fault) => fault.context(format!("report was not persisted either: {:#}", err)),
            };
            tracing::error!("{:#}", error);
            Graded {
                report,
                report_path: None,
                outcome: GradingOutcome::Fault { error },
            }
        }
    }
}

/// Persists a degenerate report for a run that could not even start
/// (e.g. the configuration is unusable).
pub async fn abort(submission_id: &str, error: anyhow::Error, settings: &Settings) -> Graded {
    let mut report = GradingReport::new(submission_id);
    report.note(format!("Grading aborted: {:#}", error));
    let (report_path, error) = match persist::persist(&report, &settings.destination).await {
        Ok(path) => (Some(path), error),
        Err(err) => (
            None,
            error.context(format!("report was not persisted either: {:#}", err)),
        ),
    };
    Graded {
        report,
        report_path,
        outcome: GradingOutcome::Fault { error },
    }
}

/// Produces the report without persisting it.
/// The returned error, if any, is a run-level fault already noted in the report.
pub async fn evaluate(req: &Request, clients: &Clients) -> (GradingReport, Option<anyhow::Error>) {
    let started = Instant::now();
    enter(Stage::Init);
    let mut report = GradingReport::new(&req.submission_id);
    let fault = match do_grade(req, clients, &mut report).await {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(err = %format_args!("{:#}", err), "grading aborted");
            report.note(format!("Grading aborted: {:#}", err));
            Some(err)
        }
    };
    report.finalize(started.elapsed());
    enter(Stage::Finalized);
    tracing::info!(
        total_score = report.total_score,
        total_max_score = report.total_max_score,
        elapsed = report.elapsed_time,
        "grading finished"
    );
    (report, fault)
}

async fn do_grade(
    req: &Request,
    clients: &Clients,
    report: &mut GradingReport,
) -> anyhow::Result<()> {
    let config = &clients.config;
    if let Some(archive) = &req.archive {
        enter(Stage::Extracting);
        if let Err(err) = extract(config, archive, &req.work_path).await {
            // nothing attempted, but the attainable total is still known
            for suite in &config.suites {
                if counts_towards_max(config, suite) {
                    report.add_unattempted(suite.max_score);
                }
            }
            return Err(err);
        }
    }

    let suites = &config.suites;
    for (index, suite) in suites.iter().enumerate() {
        if suite.skip {
            if config.count_skipped_max_score {
                report.add_unattempted(suite.max_score);
            }
            continue;
        }
        enter(Stage::Running(index));
        let span = tracing::info_span!("suite", suite = %suite.name);
        let result = run_suite(req, clients, suite).instrument(span).await;
        tracing::info!(
            suite = %suite.name,
            success = result.success,
            score = result.score,
            max_score = suite.max_score,
            "suite finished"
        );
        report.record_suite(&suite.name, suite.max_score, &result);

        if !result.success && suite.stop_on_failure {
            for rest in &suites[index + 1..] {
                if counts_towards_max(config, rest) {
                    report.add_unattempted(rest.max_score);
                }
            }
            tracing::warn!(suite = %suite.name, "stopping: suite failed and is marked stop_on_failure");
            report.note(format!(
                "Grading stopped: suite '{}' failed and is marked stop_on_failure",
                suite.name
            ));
            break;
        }
    }
    Ok(())
}

fn counts_towards_max(config: &GraderConfig, suite: &SuiteConfig) -> bool {
    !suite.skip || config.count_skipped_max_score
}

async fn extract(config: &GraderConfig, archive: &Path, work_path: &Path) -> anyhow::Result<()> {
    let policy = ExtractionPolicy {
        max_extracted_size: config.max_extract_size_bytes(),
        accepted_content_types: config
            .accepted_content_types
            .clone()
            .unwrap_or_else(|| DEFAULT_ACCEPTED.iter().map(|s| s.to_string()).collect()),
    };
    let extractor = Extractor::new(policy);
    let archive = archive.to_path_buf();
    let destination = work_path.to_path_buf();
    let span = tracing::Span::current();
    let summary = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        extractor.extract(&archive, &destination)
    })
    .await
    .context("extraction task panicked")?
    .context("failed to extract submission")?;
    tracing::info!(
        files = summary.files,
        directories = summary.directories,
        bytes = summary.bytes,
        "submission extracted"
    );
    Ok(())
}

async fn run_suite(req: &Request, clients: &Clients, suite: &SuiteConfig) -> SuiteResult {
    let implementation = match clients.registry.get(&suite.name) {
        Some(i) => i,
        None => {
            let reason = clients
                .registry
                .rejection(&suite.name)
                .unwrap_or("suite is not registered");
            return SuiteResult::failure(
                suite.max_score,
                format!("Suite '{}' could not be loaded: {}", suite.name, reason),
            );
        }
    };
    match clients
        .runner
        .run(implementation, &req.work_path, &req.submission_id, suite)
        .await
    {
        Ok(outcome) => outcome.into_result(),
        Err(err) => {
            tracing::error!(err = %format_args!("{:#}", err), "failed to run suite");
            SuiteResult::failure(
                suite.max_score,
                format!("Suite '{}' could not be started: {:#}", suite.name, err),
            )
        }
    }
}
