use crate::{BuildSuite, Suite, SuiteContext};
use anyhow::Context as _;
use grader_apis::SuiteResult;
use std::{
    path::PathBuf,
    process::{Command, Stdio},
};

/// How many trailing stderr lines end up in feedback
const STDERR_TAIL: usize = 20;

/// Runs an instructor-provided program inside the submission directory.
///
/// Lines the program prints to stdout become feedback. Exit code 0 earns the
/// whole `max_score`, anything else earns nothing.
pub struct CommandSuite {
    program: PathBuf,
    args: Vec<String>,
    work_path: PathBuf,
    max_score: f64,
    span: tracing::Span,
}

impl BuildSuite for CommandSuite {
    const CLASS: &'static str = "CommandSuite";

    fn build(ctx: SuiteContext) -> anyhow::Result<Self> {
        if !ctx.resource.is_file() {
            anyhow::bail!("{} is not a file", ctx.resource.display());
        }
        Ok(CommandSuite {
            program: ctx.resource,
            args: ctx.config.option_strings("args"),
            work_path: ctx.work_path,
            max_score: ctx.config.max_score,
            span: ctx.span,
        })
    }
}

impl Suite for CommandSuite {
    fn run(&mut self) -> anyhow::Result<SuiteResult> {
        let _enter = self.span.enter();
        tracing::debug!(program = %self.program.display(), args = ?self.args, "running command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {}", self.program.display()))?;

        let mut result = SuiteResult::new(self.max_score);
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            result.add_feedback(line);
        }
        if output.status.success() {
            result.award(self.max_score);
        } else {
            tracing::info!(status = %output.status, "command failed");
            result.add_feedback(format!("Command failed: {}", output.status));
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines.len().saturating_sub(STDERR_TAIL);
            for line in &lines[tail..] {
                result.add_feedback(*line);
            }
        }
        Ok(result)
    }
}
