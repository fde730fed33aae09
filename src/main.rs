mod host;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use processor::{GradingOutcome, ReportDestination, ReportFormat};
use std::{path::PathBuf, process::ExitCode};
use suite_loader::{Catalog, GraderConfig};
use suite_runner::{HostCommand, SuiteRunner};

/// Subcommand used to re-execute the grader as a suite host
const HOST_SUBCOMMAND: &str = "suite-host";

#[derive(Parser)]
#[command(name = "grader", version, about = "Sandboxed grading of programming submissions")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grade a single submission and write the report
    Grade(GradeArgs),
    /// Run one built-in suite, reading the request from stdin
    #[command(name = "suite-host", hide = true)]
    SuiteHost,
}

#[derive(clap::Args)]
struct GradeArgs {
    /// Grading configuration (YAML)
    #[arg(long)]
    config: PathBuf,
    /// Directory the submission is extracted into; created when missing
    #[arg(long)]
    work_dir: PathBuf,
    /// Submission archive (zip). Without it the work directory is graded as is
    #[arg(long)]
    submission: Option<PathBuf>,
    /// Submission identifier
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    id: String,
    /// Report location
    #[arg(long, default_value = "./output.txt")]
    output: PathBuf,
    /// Report location used when `--output` can not be written
    #[arg(long)]
    fallback_output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for ReportFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => ReportFormat::Text,
            Format::Json => ReportFormat::Json,
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // stdout of a suite host is the result channel
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let debug = matches!(&args.command, Command::Grade(g) if g.debug);
    init_logging(debug);
    let res = match args.command {
        Command::Grade(args) => grade(args),
        Command::SuiteHost => host::run().map(|()| ExitCode::SUCCESS),
    };
    match res {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn grade(args: GradeArgs) -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_grading(args))
}

fn create_clients(args: &GradeArgs) -> anyhow::Result<processor::Clients> {
    let config = GraderConfig::load(&args.config).context("failed to load configuration")?;
    let host = HostCommand::current_exe(&[HOST_SUBCOMMAND])?;
    Ok(processor::Clients::new(
        config,
        &Catalog::builtin(),
        SuiteRunner::new(host),
    ))
}

async fn run_grading(args: GradeArgs) -> anyhow::Result<ExitCode> {
    let mut destination = ReportDestination::new(&args.output, args.format.into());
    destination.fallback = args.fallback_output.clone();
    let settings = processor::Settings { destination };

    let prepared = prepare_work_dir(&args).and_then(|work_path| {
        let clients = create_clients(&args).context("failed to initialize grader")?;
        Ok((work_path, clients))
    });
    let graded = match prepared {
        Ok((work_path, clients)) => {
            let req = processor::Request {
                submission_id: args.id.clone(),
                archive: args.submission.clone(),
                work_path,
            };
            processor::grade(req, &clients, &settings).await
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            processor::abort(&args.id, err, &settings).await
        }
    };

    if let Some(path) = &graded.report_path {
        tracing::info!(path = %path.display(), "report saved");
    }
    match graded.outcome {
        GradingOutcome::Success => Ok(ExitCode::SUCCESS),
        GradingOutcome::Fault { error } => {
            tracing::error!("grading failed: {:#}", error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn prepare_work_dir(args: &GradeArgs) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&args.work_dir)
        .with_context(|| format!("failed to create work directory {}", args.work_dir.display()))?;
    args.work_dir
        .canonicalize()
        .with_context(|| format!("failed to resolve work directory {}", args.work_dir.display()))
}
