use crate::{BuildSuite, Suite, SuiteContext};
use grader_apis::SuiteResult;
use std::time::Duration;

/// Reports a fixed outcome. Handy for rehearsing a course configuration.
///
/// Options: `score` (defaults to `max_score`), `feedback` (string or list),
/// `error` (fail with this message), `panic` (crash with this message).
pub struct StubSuite {
    score: f64,
    max_score: f64,
    feedback: Vec<String>,
    error: Option<String>,
    panic: Option<String>,
    span: tracing::Span,
}

impl BuildSuite for StubSuite {
    const CLASS: &'static str = "StubSuite";

    fn build(ctx: SuiteContext) -> anyhow::Result<Self> {
        let config = &ctx.config;
        Ok(StubSuite {
            score: config.option_f64("score").unwrap_or(config.max_score),
            max_score: config.max_score,
            feedback: config.option_strings("feedback"),
            error: config.option_str("error").map(str::to_string),
            panic: config.option_str("panic").map(str::to_string),
            span: ctx.span,
        })
    }
}

impl Suite for StubSuite {
    fn run(&mut self) -> anyhow::Result<SuiteResult> {
        let _enter = self.span.enter();
        if let Some(msg) = &self.panic {
            panic!("{}", msg);
        }
        if let Some(msg) = &self.error {
            anyhow::bail!("{}", msg);
        }
        let mut result = SuiteResult::new(self.max_score);
        result.score = self.score;
        for line in &self.feedback {
            result.add_feedback(line.clone());
        }
        tracing::debug!(score = result.score, "stub finished");
        Ok(result)
    }
}

/// [`StubSuite`] that first sleeps for `delay_sec` seconds (default 1).
pub struct DelaySuite {
    delay: Duration,
    inner: StubSuite,
}

impl BuildSuite for DelaySuite {
    const CLASS: &'static str = "DelaySuite";

    fn build(ctx: SuiteContext) -> anyhow::Result<Self> {
        let delay_sec = ctx.config.option_f64("delay_sec").unwrap_or(1.0);
        if !(delay_sec.is_finite() && delay_sec >= 0.0) {
            anyhow::bail!("invalid delay_sec: {}", delay_sec);
        }
        Ok(DelaySuite {
            delay: Duration::from_secs_f64(delay_sec),
            inner: StubSuite::build(ctx)?,
        })
    }
}

impl Suite for DelaySuite {
    fn run(&mut self) -> anyhow::Result<SuiteResult> {
        {
            let _enter = self.inner.span.enter();
            tracing::info!(delay = ?self.delay, "sleeping before reporting");
        }
        std::thread::sleep(self.delay);
        self.inner.run()
    }
}
