use grader_apis::{SuiteConfig, SuiteResult};
use std::path::PathBuf;

/// Everything a suite is constructed from.
pub struct SuiteContext {
    /// Extracted submission
    pub work_path: PathBuf,
    pub submission_id: String,
    pub config: SuiteConfig,
    /// Resolved implementation path (a script, a manifest, ...)
    pub resource: PathBuf,
    /// Suite logger: events emitted inside this span are attributed to the suite
    pub span: tracing::Span,
}

/// Grading logic.
///
/// Returning an error means the suite could not do its job; it is reported as
/// a failed result, not as a crash.
pub trait Suite {
    fn run(&mut self) -> anyhow::Result<SuiteResult>;
}

/// Suite which can be registered in a [`Catalog`](crate::Catalog).
pub trait BuildSuite: Suite + Sized + 'static {
    /// Name used in the `class` configuration key
    const CLASS: &'static str;

    fn build(ctx: SuiteContext) -> anyhow::Result<Self>;
}
