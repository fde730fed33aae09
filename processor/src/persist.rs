//! Writing the final report to disk
use anyhow::Context;
use grader_apis::GradingReport;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Line-oriented report
    #[default]
    Text,
    /// Report serialized as JSON, rendered lines included
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }

    pub fn render(self, report: &GradingReport) -> anyhow::Result<Vec<u8>> {
        match self {
            ReportFormat::Text => Ok(report.to_text().into_bytes()),
            ReportFormat::Json => {
                let doc = JsonReport {
                    report,
                    lines: report.lines(),
                };
                let mut data =
                    serde_json::to_vec_pretty(&doc).context("failed to serialize report")?;
                data.push(b'\n');
                Ok(data)
            }
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a GradingReport,
    lines: Vec<String>,
}

/// Where the report goes.
#[derive(Debug, Clone)]
pub struct ReportDestination {
    pub primary: PathBuf,
    /// Used when `primary` can not be written.
    /// Defaults to `grader-report-<id>.<ext>` in the temporary directory.
    pub fallback: Option<PathBuf>,
    pub format: ReportFormat,
}

impl ReportDestination {
    pub fn new(primary: impl Into<PathBuf>, format: ReportFormat) -> Self {
        ReportDestination {
            primary: primary.into(),
            fallback: None,
            format,
        }
    }

    pub fn fallback_for(&self, submission_id: &str) -> PathBuf {
        match &self.fallback {
            Some(p) => p.clone(),
            None => std::env::temp_dir().join(format!(
                "grader-report-{}.{}",
                file_name_safe(submission_id),
                self.format.extension()
            )),
        }
    }
}

fn file_name_safe(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes the report, falling back to the secondary location.
/// Returns the path that was actually written.
#[tracing::instrument(skip_all, fields(primary = %dest.primary.display()))]
pub(crate) async fn persist(
    report: &GradingReport,
    dest: &ReportDestination,
) -> anyhow::Result<PathBuf> {
    let data = dest.format.render(report)?;
    let primary_err = match put_report_to(&data, &dest.primary).await {
        Ok(()) => {
            tracing::info!("report written");
            return Ok(dest.primary.clone());
        }
        Err(err) => err,
    };
    let fallback = dest.fallback_for(&report.submission_id);
    tracing::warn!(
        fallback = %fallback.display(),
        "failed to write report: {:#}, trying fallback location",
        primary_err
    );
    put_report_to(&data, &fallback).await.with_context(|| {
        format!(
            "fallback failed as well (primary error: {:#})",
            primary_err
        )
    })?;
    tracing::info!(path = %fallback.display(), "report written to fallback location");
    Ok(fallback)
}

async fn put_report_to(data: &[u8], dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    tokio::fs::write(dest, data)
        .await
        .with_context(|| format!("failed to write report to {}", dest.display()))?;
    Ok(())
}
