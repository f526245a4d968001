//! Error aggregation and the durable run report.
//!
//! Workers append records concurrently through a shared mutex; each row index
//! lands in exactly one of the two maps, at most once, because every task is
//! handled by a single worker that records a single outcome. Finalization
//! happens once, after all workers have reported or the breaker tripped.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// One failed download, keyed by row number in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
}

/// Run-level metadata embedded in the report under `METADATA`.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub source_file: String,
    pub timestamp: DateTime<Utc>,
    pub config: Config,
    pub notes: String,
    pub num_urls: usize,
    pub num_errors: usize,
}

impl RunMetadata {
    pub fn new(source_file: String, started_at: DateTime<Utc>, config: Config) -> Self {
        Self {
            source_file,
            timestamp: started_at,
            config,
            notes: String::new(),
            num_urls: 0,
            num_errors: 0,
        }
    }
}

/// Shared error log for one run.
#[derive(Debug, Serialize)]
pub struct ErrorLog {
    pub invalid_urls: BTreeMap<String, String>,
    pub download_errors: BTreeMap<String, DownloadFailure>,
    #[serde(rename = "METADATA")]
    pub metadata: RunMetadata,
}

impl ErrorLog {
    pub fn new(metadata: RunMetadata) -> Self {
        Self {
            invalid_urls: BTreeMap::new(),
            download_errors: BTreeMap::new(),
            metadata,
        }
    }

    pub fn record_invalid(&mut self, row_index: u32, url: &str) {
        self.invalid_urls
            .insert(row_index.to_string(), url.to_string());
    }

    pub fn record_failure(&mut self, row_index: u32, url: &str, error: String) {
        self.download_errors.insert(
            row_index.to_string(),
            DownloadFailure {
                url: url.to_string(),
                error,
            },
        );
    }

    /// Append a run-level note, separated from earlier notes.
    pub fn append_note(&mut self, note: &str) {
        if !self.metadata.notes.is_empty() {
            self.metadata.notes.push_str("; ");
        }
        self.metadata.notes.push_str(note);
    }

    pub fn num_errors(&self) -> usize {
        self.invalid_urls.len() + self.download_errors.len()
    }
}

/// Finalize the log and persist it as pretty-printed JSON.
///
/// Logs a human-readable summary when anything failed, then writes to
/// `report_path` or, when that file already exists, to a sibling suffixed
/// with the run's start timestamp. Returns the path actually written.
pub fn finalize(
    log: &mut ErrorLog,
    num_urls: usize,
    report_path: &Path,
) -> Result<PathBuf, ReportError> {
    log.metadata.num_urls = num_urls;
    log.metadata.num_errors = log.num_errors();

    if log.metadata.num_errors > 0 {
        warn!(
            num_errors = log.metadata.num_errors,
            num_urls, "run finished with errors"
        );
        for (row, url) in &log.invalid_urls {
            warn!(row = %row, url = %url, "invalid url");
        }
        for (row, failure) in &log.download_errors {
            warn!(row = %row, url = %failure.url, error = %failure.error, "download failed");
        }
    }

    let destination = report_destination(report_path, log.metadata.timestamp);
    let json = serde_json::to_string_pretty(&*log)?;
    std::fs::write(&destination, json)?;
    info!(path = %destination.display(), "report written");
    Ok(destination)
}

/// Pick the report path, suffixing with the run's start timestamp when the
/// canonical name is already taken.
fn report_destination(path: &Path, started_at: DateTime<Utc>) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("error_log");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let suffix = started_at.format("%Y%m%dT%H%M%S");
    let file_name = format!("{stem}_{suffix}.{ext}");

    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log() -> ErrorLog {
        ErrorLog::new(RunMetadata::new(
            "input.csv".to_string(),
            Utc::now(),
            Config::default(),
        ))
    }

    #[test]
    fn counts_cover_both_maps() {
        let mut log = test_log();
        log.record_invalid(3, "ftp://x/y.png");
        log.record_failure(5, "https://example.com/a.jpg", "HTTP 404".to_string());
        assert_eq!(log.num_errors(), 2);
    }

    #[test]
    fn notes_accumulate_with_separator() {
        let mut log = test_log();
        log.append_note("first");
        log.append_note("second");
        assert_eq!(log.metadata.notes, "first; second");
    }

    #[test]
    fn finalize_writes_expected_json_shape() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("error_log.json");

        let mut log = test_log();
        log.record_invalid(3, "ftp://x/y.png");

        let written = finalize(&mut log, 10, &report_path).unwrap();
        assert_eq!(written, report_path);

        let raw = std::fs::read_to_string(&written).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["invalid_urls"]["3"], "ftp://x/y.png");
        assert_eq!(parsed["METADATA"]["num_urls"], 10);
        assert_eq!(parsed["METADATA"]["num_errors"], 1);
        assert_eq!(parsed["METADATA"]["source_file"], "input.csv");
    }

    #[test]
    fn existing_report_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("error_log.json");
        std::fs::write(&report_path, "{}").unwrap();

        let mut log = test_log();
        let written = finalize(&mut log, 0, &report_path).unwrap();

        assert_ne!(written, report_path);
        let name = written.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("error_log_"));
        assert!(name.ends_with(".json"));
        // The canonical file kept its original content.
        assert_eq!(std::fs::read_to_string(&report_path).unwrap(), "{}");
    }
}
