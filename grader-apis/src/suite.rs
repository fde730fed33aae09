//! Suite declarations
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

pub const DEFAULT_TIMEOUT_SEC: f64 = 30.0;
pub const DEFAULT_RAM_LIMIT_MB: u64 = 512;
pub const DEFAULT_FILE_SIZE_LIMIT_MB: u64 = 50;
pub const DEFAULT_NUM_PROC_LIMIT: u64 = 100;
pub const DEFAULT_NUM_OPEN_FILES_LIMIT: u64 = 100;

/// Declares one grading unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuiteConfig {
    /// Unique within a configuration
    pub name: String,
    /// Where the implementation lives, as written in the configuration
    pub implementation_path: PathBuf,
    /// Class name of the implementation
    pub implementation_class: String,
    pub max_score: f64,
    /// Wall clock and CPU time budget, always positive
    pub timeout_sec: f64,
    pub ram_limit_mb: u64,
    pub file_size_limit_mb: u64,
    pub num_proc_limit: u64,
    pub num_open_files_limit: u64,
    pub stop_on_failure: bool,
    pub skip: bool,
    /// Suite-specific settings. Grader itself never interprets them.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl SuiteConfig {
    /// Creates config with default limits.
    pub fn new(name: &str, path: impl Into<PathBuf>, class: &str) -> Self {
        SuiteConfig {
            name: name.to_string(),
            implementation_path: path.into(),
            implementation_class: class.to_string(),
            max_score: 0.0,
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            ram_limit_mb: DEFAULT_RAM_LIMIT_MB,
            file_size_limit_mb: DEFAULT_FILE_SIZE_LIMIT_MB,
            num_proc_limit: DEFAULT_NUM_PROC_LIMIT,
            num_open_files_limit: DEFAULT_NUM_OPEN_FILES_LIMIT,
            stop_on_failure: false,
            skip: false,
            options: BTreeMap::new(),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(|v| v.as_f64())
    }

    /// Reads an option which can be given either as a single string
    /// or as a list of strings.
    pub fn option_strings(&self, key: &str) -> Vec<String> {
        match self.options.get(key) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Resolved suite implementation, ready to be executed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Implementation {
    /// Suite compiled into the grader. It is executed by a fresh copy of the
    /// grader binary running in suite host mode.
    Builtin {
        class: String,
        /// Absolute path to the file or directory the suite works with
        resource: PathBuf,
    },
    /// Standalone program which speaks the [`wire`](crate::wire) protocol.
    Executable { program: PathBuf, class: String },
}

impl Implementation {
    pub fn class(&self) -> &str {
        match self {
            Implementation::Builtin { class, .. } => class,
            Implementation::Executable { class, .. } => class,
        }
    }
}
