//! Run summary egress - writes final statistics to a JSON file

use crate::infra::config::Config;
use crate::services::aggregator::RunStatistics;
use crate::services::driver::DriverReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

/// Everything reported at the end of a run
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    /// UUIDv7 (time-sortable) run identifier
    pub run_id: String,
    pub build: &'static str,
    pub config_file: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed_events: u64,
    pub skipped_events: u64,
    pub unreadable_events: u64,
    pub statistics: &'a RunStatistics,
}

impl<'a> RunSummary<'a> {
    pub fn new(
        config: &'a Config,
        started_at: DateTime<Utc>,
        report: DriverReport,
        statistics: &'a RunStatistics,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            build: env!("GIT_HASH"),
            config_file: config.config_file(),
            started_at,
            finished_at: Utc::now(),
            processed_events: report.processed,
            skipped_events: report.skipped,
            unreadable_events: report.unreadable,
            statistics,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Write the summary, creating parent directories as needed
pub fn write_summary<P: AsRef<Path>>(path: P, summary: &RunSummary<'_>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let json = summary.to_json()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    match fs::write(path, json) {
        Ok(()) => {
            info!(run_id = %summary.run_id, path = %path.display(), "summary_written");
            Ok(())
        }
        Err(e) => {
            error!(
                run_id = %summary.run_id,
                path = %path.display(),
                error = %e,
                "summary_write_failed"
            );
            Err(e.into())
        }
    }
}
