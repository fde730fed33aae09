//! Protocol between the grader and a suite process.
//!
//! The grader writes exactly one [`SuiteRequest`] as a single JSON line to the
//! child's stdin. The child answers with a JSON object on the last non-empty
//! line of its stdout. Every field of the answer is optional, so that a
//! sloppy suite degrades to a zero score instead of crashing the grader.
use crate::{SuiteConfig, SuiteResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable set for every suite process: submission identifier.
pub const ENV_SUBMISSION_ID: &str = "GRADER_SUBMISSION_ID";
/// Environment variable set for every suite process: extracted submission.
pub const ENV_WORK_PATH: &str = "GRADER_WORK_PATH";
/// Environment variable set for every suite process: suite name.
pub const ENV_SUITE: &str = "GRADER_SUITE";

/// Everything a suite process needs to construct and run the suite.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuiteRequest {
    pub class: String,
    pub resource: PathBuf,
    pub work_path: PathBuf,
    pub submission_id: String,
    pub config: SuiteConfig,
}

impl SuiteRequest {
    /// Serializes request into a single line (including trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Suite answer as seen on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WireResult {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub feedback_messages: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<&SuiteResult> for WireResult {
    fn from(res: &SuiteResult) -> Self {
        WireResult {
            success: Some(res.success),
            score: Some(res.score),
            max_score: Some(res.max_score),
            feedback_messages: Some(res.feedback_messages.clone()),
            error: res.error.clone(),
        }
    }
}

impl WireResult {
    /// Converts the answer into a result, filling gaps with safe defaults.
    /// `max_score` always comes from the configuration, which is authoritative.
    pub fn into_result(self, max_score: f64) -> SuiteResult {
        let feedback_messages = self.feedback_messages.unwrap_or_default();
        match self.success {
            Some(true) => SuiteResult {
                success: true,
                score: self.score.unwrap_or(0.0),
                max_score,
                feedback_messages,
                error: None,
            },
            Some(false) => {
                let mut res = SuiteResult::failure(
                    max_score,
                    self.error.unwrap_or_default(),
                );
                res.feedback_messages = feedback_messages;
                res
            }
            None => {
                let mut res =
                    SuiteResult::failure(max_score, "suite result does not report success");
                res.feedback_messages = feedback_messages;
                res
            }
        }
    }
}

/// Finds the answer in the captured stdout: the last line which is a JSON
/// object carrying `success`. Other JSON lines are suite chatter and skipped.
/// Returns `None` if there is no such line.
pub fn parse_output(stdout: &str) -> Option<WireResult> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<WireResult>(line).ok())
        .find(|answer| answer.success.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_safely() {
        let wire = parse_output(r#"{"success": true}"#).unwrap();
        let res = wire.into_result(15.0);
        assert!(res.success);
        assert_eq!(res.score, 0.0);
        assert_eq!(res.max_score, 15.0);
        assert!(res.feedback_messages.is_empty());
    }

    #[test]
    fn result_is_the_last_json_line() {
        let out = "compiling...\n{\"success\": false, \"error\": \"old\"}\nnoise\n{\"success\": true, \"score\": 3}\n\n";
        let res = parse_output(out).unwrap().into_result(5.0);
        assert!(res.success);
        assert_eq!(res.score, 3.0);
    }

    #[test]
    fn absent_success_is_a_failure() {
        let wire: WireResult = serde_json::from_str(r#"{"score": 4}"#).unwrap();
        let res = wire.into_result(5.0);
        assert!(!res.success);
        assert_eq!(res.score, 0.0);
        assert!(res.error.is_some());
    }

    #[test]
    fn stray_json_does_not_hide_result() {
        let out = "{\"success\": true, \"score\": 3}\n{\"foo\": 1}\n{\"score\": 9}\n";
        let res = parse_output(out).unwrap().into_result(5.0);
        assert!(res.success);
        assert_eq!(res.score, 3.0);
        assert!(parse_output("{\"foo\": 1}\n").is_none());
    }

    #[test]
    fn no_json_means_no_result() {
        assert!(parse_output("hello\nworld\n").is_none());
        assert!(parse_output("").is_none());
    }

    #[test]
    fn request_is_single_line() {
        let config = SuiteConfig::new("a", "b", "c");
        let req = SuiteRequest {
            class: "c".to_string(),
            resource: "/b".into(),
            work_path: "/work".into(),
            submission_id: "12".to_string(),
            config,
        };
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
