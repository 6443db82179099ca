use std::path::{Path, PathBuf};

use querycraft_types::{EvalResult, RunSummary};
use serde::Serialize;
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted run artifact.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub timestamp: String,
    pub eval_set: &'a str,
    pub summary: &'a RunSummary,
    pub results: &'a [EvalResult],
}

impl<'a> Report<'a> {
    pub fn new(eval_set: &'a str, summary: &'a RunSummary, results: &'a [EvalResult]) -> Self {
        Self {
            timestamp: chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            eval_set,
            summary,
            results,
        }
    }
}

/// Writes the run artifact to a fixed path, replacing whatever was there.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn persist(
        &self,
        eval_set: &str,
        summary: &RunSummary,
        results: &[EvalResult],
    ) -> Result<(), ReportError> {
        self.write(&Report::new(eval_set, summary, results)).await
    }

    /// Serializes to a sibling temp file first, then renames over the target.
    pub async fn write(&self, report: &Report<'_>) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(report)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| self.io_error(source))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await.map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|source| self.io_error(source))?;

        tracing::info!(path = ?self.path, results = report.results.len(), "report written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn io_error(&self, source: std::io::Error) -> ReportError {
        ReportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
