//! Final grading report.
//!
//! The report is accumulated suite by suite. Rendering always puts the
//! submission id, the totals and the elapsed time first, followed by suite
//! sections in execution order; downstream consumers depend on this layout.
use crate::SuiteResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GradingReport {
    pub submission_id: String,
    pub total_score: f64,
    pub total_max_score: f64,
    /// Wall clock duration of the run, in seconds
    pub elapsed_time: f64,
    /// Suite-delimited feedback lines, without the header
    pub feedback: Vec<String>,
    /// Number of suite sections recorded so far
    #[serde(default)]
    sections: usize,
}

impl GradingReport {
    pub fn new(submission_id: &str) -> Self {
        GradingReport {
            submission_id: submission_id.to_string(),
            total_score: 0.0,
            total_max_score: 0.0,
            elapsed_time: 0.0,
            feedback: Vec::new(),
            sections: 0,
        }
    }

    /// Accounts points which are attainable but were not attempted.
    pub fn add_unattempted(&mut self, max_score: f64) {
        self.total_max_score += max_score;
    }

    /// Appends a section for a suite that has run, whatever the outcome was.
    /// Failed results contribute zero points and their error replaces the
    /// suite's own messages.
    pub fn record_suite(&mut self, name: &str, max_score: f64, result: &SuiteResult) {
        self.total_max_score += max_score;
        self.begin_section(name);
        if result.success {
            self.total_score += result.score;
            self.feedback.extend(result.feedback_messages.iter().cloned());
            self.feedback
                .push(format!("{:?} / {}", result.score, result.max_score));
        } else {
            let reason = result
                .error
                .as_deref()
                .filter(|e| !e.is_empty())
                .unwrap_or("No error message provided");
            self.feedback.push(format!("Suite failed: {}", reason));
            self.feedback.push(format!("0 / {}", max_score));
        }
    }

    /// Appends a run-level line after all suite sections.
    pub fn note(&mut self, line: impl Into<String>) {
        self.feedback.push(line.into());
    }

    pub fn finalize(&mut self, elapsed: Duration) {
        self.elapsed_time = elapsed.as_secs_f64();
    }

    /// Number of suite sections in the report.
    pub fn section_count(&self) -> usize {
        self.sections
    }

    /// Header lines followed by the feedback.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.feedback.len() + 3);
        lines.push(format!("Submission ID: {}", self.submission_id));
        lines.push(format!(
            "Total score: {:?} / {}",
            self.total_score, self.total_max_score
        ));
        lines.push(format!("Elapsed time: {:.3}s", self.elapsed_time));
        lines.extend(self.feedback.iter().cloned());
        lines
    }

    /// Text representation, one newline-terminated line per entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn begin_section(&mut self, name: &str) {
        self.sections += 1;
        self.feedback.push(String::new());
        self.feedback
            .push(format!("{}{}{}", SECTION_PREFIX, name, SECTION_SUFFIX));
    }
}

const SECTION_PREFIX: &str = "=== Suite: ";
const SECTION_SUFFIX: &str = " ===";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_comes_first() {
        let mut report = GradingReport::new("42");
        let mut res = SuiteResult::new(20.0);
        res.score = 20.0;
        res.add_feedback("all good");
        report.record_suite("compile", 20.0, &res);
        report.finalize(Duration::from_millis(1500));

        assert_eq!(
            report.lines(),
            vec![
                "Submission ID: 42",
                "Total score: 20.0 / 20",
                "Elapsed time: 1.500s",
                "",
                "=== Suite: compile ===",
                "all good",
                "20.0 / 20",
            ]
        );
        assert_eq!(report.section_count(), 1);
    }

    #[test]
    fn failure_replaces_messages_with_reason() {
        let mut report = GradingReport::new("7");
        let mut res = SuiteResult::failure(10.0, "boom");
        res.add_feedback("should not be shown");
        report.record_suite("run", 10.0, &res);
        assert_eq!(report.total_score, 0.0);
        assert_eq!(report.total_max_score, 10.0);
        assert_eq!(
            report.feedback,
            vec!["", "=== Suite: run ===", "Suite failed: boom", "0 / 10"]
        );
    }

    #[test]
    fn suite_output_does_not_add_sections() {
        let mut report = GradingReport::new("3");
        let mut res = SuiteResult::new(5.0);
        res.score = 5.0;
        res.add_feedback("=== Suite: fake ===");
        report.record_suite("real", 5.0, &res);
        report.note("=== Suite: trailer ===");
        assert_eq!(report.section_count(), 1);
        assert_eq!(report.feedback[1], "=== Suite: real ===");
        assert_eq!(report.feedback[2], "=== Suite: fake ===");
    }

    #[test]
    fn text_is_newline_terminated() {
        let report = GradingReport::new("1");
        let text = report.to_text();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 3);
    }
}
