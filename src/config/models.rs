use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Task source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// CSV file holding the URL list
    #[serde(default = "default_source_file")]
    pub file: PathBuf,
    /// Header name of the column with the URLs
    #[serde(default = "default_url_column")]
    pub url_column: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            file: default_source_file(),
            url_column: default_url_column(),
        }
    }
}

fn default_source_file() -> PathBuf {
    PathBuf::from("input.csv")
}

fn default_url_column() -> String {
    "URL".to_string()
}

/// Download engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Directory receiving one file per successful download
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// Gate capacity: workers concurrently past the network I/O boundary
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    /// Total fetch attempts per task, counting the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Consecutive retry-exhausted failures that halt the run
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    /// Post-success pacing delay range, milliseconds
    #[serde(default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,
    #[serde(default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            breaker_threshold: default_breaker_threshold(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
        }
    }
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("downloaded_images")
}

fn default_max_concurrent_downloads() -> usize {
    64
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_breaker_threshold() -> u32 {
    100
}

fn default_pacing_min_ms() -> u64 {
    100
}

fn default_pacing_max_ms() -> u64 {
    400
}

/// Report sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Canonical report path; an existing file gets a timestamp-suffixed
    /// sibling instead of being overwritten
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

fn default_report_path() -> PathBuf {
    PathBuf::from("error_log.json")
}
