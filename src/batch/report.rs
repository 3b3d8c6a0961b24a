//! Per-row outcome of a batch run.

use crate::error::{Result, ResultExt as _};
use crate::source::RowId;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    Success { artifacts: Vec<PathBuf> },
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub row: RowId,
    #[serde(flatten)]
    pub status: RowStatus,
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RowStatus::Success { .. })
    }
}

/// Report generated after a batch run, in dataset row order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,

    pub output_dir: PathBuf,

    /// RFC 3339 start time
    pub started_at: String,

    pub rows: Vec<RowOutcome>,

    /// Time taken for the whole run
    #[serde(skip)]
    pub duration: std::time::Duration,
}

impl RunReport {
    pub fn successes(&self) -> usize {
        self.rows.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.rows.iter().filter(|r| !r.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Every file written during the run.
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.rows
            .iter()
            .flat_map(|r| match &r.status {
                RowStatus::Success { artifacts } => artifacts.as_slice(),
                RowStatus::Failure { .. } => &[],
            })
            .map(PathBuf::as_path)
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "{}: {} of {} rows generated, {} failed, {} files in {} ({:.2}s)",
            self.workflow,
            self.successes(),
            self.rows.len(),
            self.failure_count(),
            self.artifacts().count(),
            self.output_dir.display(),
            self.duration.as_secs_f64()
        )
    }

    /// Writes the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))
    }
}
