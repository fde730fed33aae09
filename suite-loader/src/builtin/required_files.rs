use crate::{BuildSuite, Suite, SuiteContext};
use anyhow::Context as _;
use grader_apis::SuiteResult;
use std::path::PathBuf;

/// Checks that the submission contains the files listed in the resource
/// file, one relative path per line. Blank lines and `#` comments are ignored.
pub struct RequiredFilesSuite {
    required: Vec<String>,
    work_path: PathBuf,
    max_score: f64,
    span: tracing::Span,
}

impl BuildSuite for RequiredFilesSuite {
    const CLASS: &'static str = "RequiredFilesSuite";

    fn build(ctx: SuiteContext) -> anyhow::Result<Self> {
        let listing = std::fs::read_to_string(&ctx.resource)
            .with_context(|| format!("failed to read {}", ctx.resource.display()))?;
        let required: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        if required.is_empty() {
            anyhow::bail!("{} lists no files", ctx.resource.display());
        }
        Ok(RequiredFilesSuite {
            required,
            work_path: ctx.work_path,
            max_score: ctx.config.max_score,
            span: ctx.span,
        })
    }
}

impl Suite for RequiredFilesSuite {
    fn run(&mut self) -> anyhow::Result<SuiteResult> {
        let _enter = self.span.enter();
        let mut result = SuiteResult::new(self.max_score);
        let per_file = self.max_score / self.required.len() as f64;
        for name in &self.required {
            if self.work_path.join(name).exists() {
                result.add_feedback(format!("Found: {}", name));
                result.award(per_file);
            } else {
                tracing::debug!(file = %name, "required file missing");
                result.add_feedback(format!("Missing: {}", name));
            }
        }
        Ok(result)
    }
}
