//! Outcome of a single suite.
use serde::{Deserialize, Serialize};

/// Result returned by a suite.
///
/// `success` tells whether the suite ran to completion; it says nothing about
/// how many checks inside the suite passed. Failed results always carry an
/// error description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuiteResult {
    pub success: bool,
    pub score: f64,
    pub max_score: f64,
    /// Human-readable record, kept in insertion order
    pub feedback_messages: Vec<String>,
    pub error: Option<String>,
}

impl SuiteResult {
    /// Successful result with zero score. Suites usually start from this one
    /// and add points and messages as checks pass.
    pub fn new(max_score: f64) -> Self {
        SuiteResult {
            success: true,
            score: 0.0,
            max_score,
            feedback_messages: Vec::new(),
            error: None,
        }
    }

    /// Failed result with the given description.
    pub fn failure(max_score: f64, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "No error message provided".to_string();
        }
        SuiteResult {
            success: false,
            score: 0.0,
            max_score,
            feedback_messages: Vec::new(),
            error: Some(error),
        }
    }

    pub fn add_feedback(&mut self, message: impl Into<String>) {
        self.feedback_messages.push(message.into());
    }

    /// Adds `points` to the score without going above `max_score`.
    pub fn award(&mut self, points: f64) {
        self.score = (self.score + points).min(self.max_score);
    }

    /// Enforces result invariants: failures carry an error and score nothing,
    /// successes keep their score within `[0, max_score]`.
    /// Returns `true` if something had to be changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.success {
            if self.error.is_some() {
                self.error = None;
                changed = true;
            }
            let clamped = if self.score.is_nan() {
                0.0
            } else {
                self.score.max(0.0).min(self.max_score)
            };
            if clamped != self.score {
                self.score = clamped;
                changed = true;
            }
        } else {
            if self.error.as_deref().map_or(true, str::is_empty) {
                self.error = Some("No error message provided".to_string());
                changed = true;
            }
            if self.score != 0.0 {
                self.score = 0.0;
                changed = true;
            }
        }
        changed
    }
}
