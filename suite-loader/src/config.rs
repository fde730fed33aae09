//! Grading configuration (`config.yaml`) representation
use grader_apis::suite::{
    SuiteConfig, DEFAULT_FILE_SIZE_LIMIT_MB, DEFAULT_NUM_OPEN_FILES_LIMIT,
    DEFAULT_NUM_PROC_LIMIT, DEFAULT_RAM_LIMIT_MB, DEFAULT_TIMEOUT_SEC,
};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

const DEFAULT_MAX_EXTRACT_SIZE_MB: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration syntax")]
    Syntax(#[source] serde_yaml::Error),
    #[error("no suites specified in configuration")]
    NoSuites,
    #[error("suite entry #{index} must be a map with exactly one key, the suite name")]
    MalformedEntry { index: usize },
    #[error("suite '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("invalid timeout for suite '{name}': {timeout_sec} seconds")]
    InvalidTimeout { name: String, timeout_sec: f64 },
    #[error("invalid max_score for suite '{name}': {max_score}")]
    InvalidMaxScore { name: String, max_score: f64 },
}

/// Validated grading configuration
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// In declaration order, skipped suites included
    pub suites: Vec<SuiteConfig>,
    pub max_extract_size_mb: u64,
    /// `None` means the extractor's defaults
    pub accepted_content_types: Option<Vec<String>>,
    /// Whether skipped suites still add their `max_score` to the attainable total
    pub count_skipped_max_score: bool,
    /// Relative implementation paths are resolved against this directory
    pub base_dir: PathBuf,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    suites: Option<Vec<BTreeMap<String, RawSuite>>>,
    #[serde(default = "RawConfig::default_max_extract_size_mb")]
    max_extract_size_mb: u64,
    #[serde(default)]
    accepted_content_types: Option<Vec<String>>,
    #[serde(default)]
    count_skipped_max_score: bool,
}

impl RawConfig {
    fn default_max_extract_size_mb() -> u64 {
        DEFAULT_MAX_EXTRACT_SIZE_MB
    }
}

#[derive(Deserialize)]
struct RawSuite {
    path: PathBuf,
    class: String,
    #[serde(default)]
    max_score: f64,
    #[serde(default = "RawSuite::default_timeout_sec")]
    timeout_sec: f64,
    #[serde(default = "RawSuite::default_ram_limit_mb")]
    ram_limit_mb: u64,
    #[serde(default = "RawSuite::default_file_size_limit_mb")]
    file_size_limit_mb: u64,
    #[serde(default = "RawSuite::default_num_proc_limit")]
    num_proc_limit: u64,
    #[serde(default = "RawSuite::default_num_open_files_limit")]
    num_open_files_limit: u64,
    #[serde(default)]
    stop_on_failure: bool,
    #[serde(default)]
    skip: bool,
    #[serde(flatten)]
    options: BTreeMap<String, serde_json::Value>,
}

impl RawSuite {
    fn default_timeout_sec() -> f64 {
        DEFAULT_TIMEOUT_SEC
    }

    fn default_ram_limit_mb() -> u64 {
        DEFAULT_RAM_LIMIT_MB
    }

    fn default_file_size_limit_mb() -> u64 {
        DEFAULT_FILE_SIZE_LIMIT_MB
    }

    fn default_num_proc_limit() -> u64 {
        DEFAULT_NUM_PROC_LIMIT
    }

    fn default_num_open_files_limit() -> u64 {
        DEFAULT_NUM_OPEN_FILES_LIMIT
    }

    fn into_config(self, name: String) -> SuiteConfig {
        SuiteConfig {
            name,
            implementation_path: self.path,
            implementation_class: self.class,
            max_score: self.max_score,
            timeout_sec: self.timeout_sec,
            ram_limit_mb: self.ram_limit_mb,
            file_size_limit_mb: self.file_size_limit_mb,
            num_proc_limit: self.num_proc_limit,
            num_open_files_limit: self.num_open_files_limit,
            stop_on_failure: self.stop_on_failure,
            skip: self.skip,
            options: self.options,
        }
    }
}

impl GraderConfig {
    /// Reads and validates configuration file.
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<GraderConfig, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let config = GraderConfig::parse(&data, &base_dir)?;
        tracing::info!(suites = config.suites.len(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(data: &str, base_dir: &Path) -> Result<GraderConfig, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(data).map_err(ConfigError::Syntax)?;
        let entries = match raw.suites {
            Some(s) if !s.is_empty() => s,
            _ => return Err(ConfigError::NoSuites),
        };
        let mut seen = HashSet::new();
        let mut suites = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            if entry.len() != 1 {
                return Err(ConfigError::MalformedEntry { index });
            }
            let (name, raw_suite) = entry
                .into_iter()
                .next()
                .ok_or(ConfigError::MalformedEntry { index })?;
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            let suite = raw_suite.into_config(name);
            validate(&suite)?;
            suites.push(suite);
        }
        Ok(GraderConfig {
            suites,
            max_extract_size_mb: raw.max_extract_size_mb,
            accepted_content_types: raw.accepted_content_types,
            count_skipped_max_score: raw.count_skipped_max_score,
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Suites which are not marked `skip`, in declaration order.
    pub fn active_suites(&self) -> impl Iterator<Item = &SuiteConfig> {
        self.suites.iter().filter(|s| !s.skip)
    }

    pub fn max_extract_size_bytes(&self) -> u64 {
        self.max_extract_size_mb.saturating_mul(1024 * 1024)
    }
}

fn validate(suite: &SuiteConfig) -> Result<(), ConfigError> {
    if !(suite.timeout_sec.is_finite() && suite.timeout_sec > 0.0) {
        return Err(ConfigError::InvalidTimeout {
            name: suite.name.clone(),
            timeout_sec: suite.timeout_sec,
        });
    }
    if !(suite.max_score.is_finite() && suite.max_score >= 0.0) {
        return Err(ConfigError::InvalidMaxScore {
            name: suite.name.clone(),
            max_score: suite.max_score,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
max_extract_size_mb: 10
suites:
  - compile:
      path: suites/compile.sh
      class: CommandSuite
      max_score: 20
      timeout_sec: 5
      stop_on_failure: true
      args: ["-j", "2"]
  - run:
      path: suites/run
      class: RunSuite
      max_score: 80
      skip: true
"#;

    #[test]
    fn parses_suites_in_order_with_defaults() {
        let config = GraderConfig::parse(SAMPLE, Path::new("/course")).unwrap();
        assert_eq!(config.max_extract_size_mb, 10);
        assert_eq!(config.base_dir, Path::new("/course"));
        assert!(!config.count_skipped_max_score);
        assert!(config.accepted_content_types.is_none());

        let names: Vec<_> = config.suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["compile", "run"]);

        let compile = &config.suites[0];
        assert_eq!(compile.implementation_class, "CommandSuite");
        assert_eq!(compile.max_score, 20.0);
        assert_eq!(compile.timeout_sec, 5.0);
        assert!(compile.stop_on_failure);
        assert_eq!(compile.ram_limit_mb, DEFAULT_RAM_LIMIT_MB);
        assert_eq!(compile.option_strings("args"), vec!["-j", "2"]);
        assert!(!compile.options.contains_key("path"));

        let run = &config.suites[1];
        assert!(run.skip);
        assert_eq!(run.timeout_sec, DEFAULT_TIMEOUT_SEC);
        assert_eq!(config.active_suites().count(), 1);
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let data = "suites:\n  - a:\n      path: a\n      class: A\n      timeout_sec: 0\n";
        match GraderConfig::parse(data, Path::new(".")) {
            Err(ConfigError::InvalidTimeout { name, .. }) => assert_eq!(name, "a"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let data = "suites:\n  - a:\n      path: a\n      class: A\n  - a:\n      path: b\n      class: B\n";
        assert!(matches!(
            GraderConfig::parse(data, Path::new(".")),
            Err(ConfigError::DuplicateName(n)) if n == "a"
        ));
    }

    #[test]
    fn rejects_missing_or_empty_suites() {
        assert!(matches!(
            GraderConfig::parse("max_extract_size_mb: 3\n", Path::new(".")),
            Err(ConfigError::NoSuites)
        ));
        assert!(matches!(
            GraderConfig::parse("suites: []\n", Path::new(".")),
            Err(ConfigError::NoSuites)
        ));
    }

    #[test]
    fn rejects_multi_key_entries() {
        let data = "suites:\n  - a:\n      path: a\n      class: A\n    b:\n      path: b\n      class: B\n";
        assert!(matches!(
            GraderConfig::parse(data, Path::new(".")),
            Err(ConfigError::MalformedEntry { index: 0 })
        ));
    }

    #[test]
    fn rejects_negative_max_score() {
        let data = "suites:\n  - a:\n      path: a\n      class: A\n      max_score: -5\n";
        assert!(matches!(
            GraderConfig::parse(data, Path::new(".")),
            Err(ConfigError::InvalidMaxScore { .. })
        ));
    }

    #[test]
    fn missing_class_is_a_syntax_error() {
        let data = "suites:\n  - a:\n      path: a\n";
        assert!(matches!(
            GraderConfig::parse(data, Path::new(".")),
            Err(ConfigError::Syntax(_))
        ));
    }
}
