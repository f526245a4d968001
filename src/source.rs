//! Task sources: where `(row_index, url)` pairs come from.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read task source: {0}")]
    Read(#[from] csv::Error),

    #[error("column '{column}' not found in source header")]
    MissingColumn { column: String },
}

/// One input row: a URL to download and the row it came from.
///
/// Immutable once produced. Row indices are 0-based and exclude the header
/// row; they key the report entries for this task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub row_index: u32,
    pub url: String,
}

/// Anything that can produce the run's task list.
pub trait TaskSource {
    fn tasks(&self) -> Result<Vec<Task>, SourceError>;
}

/// CSV-backed task source.
///
/// Reads the header row, locates the configured column by name, and yields
/// one task per record in file order. Cells the record cannot supply (short
/// rows) come out empty so the worker's validation records them as invalid
/// instead of silently dropping the row.
pub struct CsvTaskSource {
    path: PathBuf,
    url_column: String,
}

impl CsvTaskSource {
    pub fn new(path: impl Into<PathBuf>, url_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url_column: url_column.into(),
        }
    }
}

impl TaskSource for CsvTaskSource {
    fn tasks(&self) -> Result<Vec<Task>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let headers = reader.headers()?;
        let column = headers
            .iter()
            .position(|h| h == self.url_column)
            .ok_or_else(|| SourceError::MissingColumn {
                column: self.url_column.clone(),
            })?;

        let mut tasks = Vec::new();
        for (row_index, record) in reader.records().enumerate() {
            let record = record?;
            let url = record.get(column).unwrap_or("").trim().to_string();
            tasks.push(Task {
                row_index: row_index as u32,
                url,
            });
        }
        Ok(tasks)
    }
}
