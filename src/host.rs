//! Suite host: the child side of the suite protocol for built-in suites.
//!
//! Runs without an async runtime, so resource limits inherited from the
//! runner only have to accommodate the suite itself.
use anyhow::Context;
use grader_apis::{
    wire::{SuiteRequest, WireResult},
    SuiteResult,
};
use std::{
    any::Any,
    io::{BufRead, Write},
    panic::{self, AssertUnwindSafe},
};
use suite_loader::{Catalog, SuiteContext};

pub(crate) fn run() -> anyhow::Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read suite request")?;
    let request: SuiteRequest =
        serde_json::from_str(&line).context("failed to parse suite request")?;

    let span = tracing::info_span!(
        "suite",
        suite = %request.config.name,
        class = %request.class,
        submission_id = %request.submission_id
    );
    let result = span.in_scope(|| execute(&Catalog::builtin(), request, span.clone()));

    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, &WireResult::from(&result))
        .context("failed to serialize suite result")?;
    writeln!(out).context("failed to write suite result")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

/// Builds and runs the suite. Errors and panics become failed results.
fn execute(catalog: &Catalog, request: SuiteRequest, span: tracing::Span) -> SuiteResult {
    let max_score = request.config.max_score;
    let class = request.class;
    let ctx = SuiteContext {
        work_path: request.work_path,
        submission_id: request.submission_id,
        config: request.config,
        resource: request.resource,
        span,
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut suite = catalog.instantiate(&class, ctx)?;
        suite.run()
    }));
    match outcome {
        Ok(Ok(result)) => {
            tracing::info!(score = result.score, success = result.success, "suite done");
            result
        }
        Ok(Err(err)) => {
            tracing::warn!(err = %format_args!("{:#}", err), "suite failed");
            SuiteResult::failure(max_score, format!("{:#}", err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "suite panicked");
            SuiteResult::failure(max_score, format!("suite panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
