//! Runs a single suite in a child process, isolated from the grader and
//! from other suites.
//!
//! Every suite gets a fresh process (its own process group and session),
//! OS resource limits derived from [`SuiteConfig`] and a wall-clock deadline.
//! Built-in suites run in the grader binary re-executed in host mode; suite
//! programs are executed directly. Both speak the protocol from
//! [`grader_apis::wire`].
use anyhow::Context;
use child::{Launch, SuiteProcess};
use grader_apis::{
    wire::{self, SuiteRequest, ENV_SUBMISSION_ID, ENV_SUITE, ENV_WORK_PATH},
    Implementation, SuiteConfig, SuiteResult,
};
use std::{
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
    time::{Duration, Instant},
};

mod child;
mod limits;

pub use limits::ResourceLimits;

/// How to launch the suite host (used for built-in suites).
#[derive(Debug, Clone)]
pub struct HostCommand {
    pub exe: PathBuf,
    pub args: Vec<String>,
}

impl HostCommand {
    /// Host is the currently running executable, invoked with `args`.
    pub fn current_exe(args: &[&str]) -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("failed to locate grader executable")?;
        Ok(HostCommand {
            exe,
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// What happened to a suite process.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Process exited cleanly. The result may still be a failure reported
    /// by the suite itself.
    Completed(SuiteResult),
    /// Wall-clock deadline expired; the process group was killed.
    TimedOut { max_score: f64, error: String },
    /// Process exited with non-zero status or was killed by a signal.
    Crashed {
        exit_code: Option<i32>,
        signal: Option<i32>,
        max_score: f64,
        error: String,
    },
}

impl RunOutcome {
    pub fn into_result(self) -> SuiteResult {
        match self {
            RunOutcome::Completed(res) => res,
            RunOutcome::TimedOut { max_score, error }
            | RunOutcome::Crashed {
                max_score, error, ..
            } => SuiteResult::failure(max_score, error),
        }
    }
}

pub struct SuiteRunner {
    host: HostCommand,
}

impl SuiteRunner {
    pub fn new(host: HostCommand) -> Self {
        SuiteRunner { host }
    }

    /// Runs suite to completion or until its deadline.
    ///
    /// Errors are returned only when the process could not be started or
    /// talked to at all; everything the suite itself does wrong is reported
    /// through [`RunOutcome`].
    #[tracing::instrument(skip_all, fields(suite = %config.name, class = implementation.class()))]
    pub async fn run(
        &self,
        implementation: &Implementation,
        work_path: &Path,
        submission_id: &str,
        config: &SuiteConfig,
    ) -> anyhow::Result<RunOutcome> {
        let (program, args, resource) = match implementation {
            Implementation::Builtin { resource, .. } => {
                (self.host.exe.as_path(), self.host.args.as_slice(), resource)
            }
            Implementation::Executable { program, .. } => (program.as_path(), &[][..], program),
        };
        let request = SuiteRequest {
            class: implementation.class().to_string(),
            resource: resource.clone(),
            work_path: work_path.to_path_buf(),
            submission_id: submission_id.to_string(),
            config: config.clone(),
        };
        let request = request
            .to_line()
            .context("failed to serialize suite request")?;

        let deadline = Duration::try_from_secs_f64(config.timeout_sec)
            .with_context(|| format!("invalid timeout {}", config.timeout_sec))?;
        let limits = ResourceLimits::from_config(config);
        tracing::debug!(?limits, program = %program.display(), "spawning suite process");
        let mut process = SuiteProcess::spawn(Launch {
            program,
            args,
            work_path,
            envs: vec![
                (ENV_SUBMISSION_ID, submission_id.to_string()),
                (ENV_WORK_PATH, work_path.display().to_string()),
                (ENV_SUITE, config.name.clone()),
            ],
            limits,
        })
        .await?;

        let started = Instant::now();
        let exchanged = tokio::time::timeout(deadline, process.exchange(&request)).await;
        // reap anything the suite left running in its group
        process.kill().await;
        let (status, stdout) = match exchanged {
            Ok(exchanged) => exchanged?,
            Err(_elapsed) => {
                let error = format!(
                    "Suite '{}' timed out after {} seconds",
                    config.name, config.timeout_sec
                );
                tracing::warn!(elapsed = ?started.elapsed(), "suite timed out");
                return Ok(RunOutcome::TimedOut {
                    max_score: config.max_score,
                    error,
                });
            }
        };
        tracing::debug!(elapsed = ?started.elapsed(), %status, "suite process finished");
        Ok(classify(config, status, &stdout))
    }
}

fn classify(config: &SuiteConfig, status: ExitStatus, stdout: &str) -> RunOutcome {
    if status.success() {
        let result = match wire::parse_output(stdout) {
            Some(answer) => {
                let mut result = answer.into_result(config.max_score);
                if result.normalize() {
                    tracing::warn!(
                        score = result.score,
                        max_score = result.max_score,
                        "suite reported inconsistent result, normalized"
                    );
                }
                result
            }
            None => {
                tracing::warn!("suite exited without reporting a result");
                SuiteResult::failure(
                    config.max_score,
                    format!("Suite '{}' exited without reporting a result", config.name),
                )
            }
        };
        return RunOutcome::Completed(result);
    }

    let exit_code = status.code();
    let signal = status.signal();
    let error = match (exit_code, signal) {
        (Some(code), _) => format!("Suite '{}' exited with code {}", config.name, code),
        (None, Some(signal)) => format!(
            "Suite '{}' was killed by {}",
            config.name,
            describe_signal(signal)
        ),
        (None, None) => format!("Suite '{}' terminated abnormally", config.name),
    };
    tracing::warn!(?exit_code, ?signal, "suite process crashed");
    RunOutcome::Crashed {
        exit_code,
        signal,
        max_score: config.max_score,
        error,
    }
}

fn describe_signal(signal: i32) -> String {
    use nix::sys::signal::Signal;
    match Signal::try_from(signal) {
        Ok(Signal::SIGXCPU) => "SIGXCPU (CPU time limit exceeded)".to_string(),
        Ok(Signal::SIGXFSZ) => "SIGXFSZ (file size limit exceeded)".to_string(),
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {}", signal),
    }
}
