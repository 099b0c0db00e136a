//! CSV History Writer: append-only, RFC 4180 encoded record of every probe
//! outcome. Uses the `csv` crate's `WriterBuilder` the way the pack's own
//! provisioning-report encoder does, rather than hand-rolled escaping.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::HealthCheckResult;

pub const CSV_HEADER: &str =
    "timestamp,service_name,status,latency_ms,http_status_code,failure_reason,correlation_id";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to open history file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write history record: {0}")]
    Write(#[from] csv::Error),
    #[error("failed to flush history file: {0}")]
    Flush(#[from] std::io::Error),
}

pub struct HistoryWriter {
    path: PathBuf,
}

impl HistoryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a single result, writing the header first if the file does
    /// not yet exist. Flushes immediately so the write is durable against a
    /// crash at record granularity.
    pub fn append(&self, result: &HealthCheckResult) -> Result<(), HistoryError> {
        self.append_batch(std::slice::from_ref(result))
    }

    /// Append several results in one open/flush cycle.
    pub fn append_batch(&self, results: &[HealthCheckResult]) -> Result<(), HistoryError> {
        if results.is_empty() {
            return Ok(());
        }

        let needs_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| HistoryError::Open {
                path: self.path.display().to_string(),
                source,
            })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(CSV_HEADER.split(','))?;
        }

        for result in results {
            writer.write_record(&record_fields(result))?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_fields(result: &HealthCheckResult) -> [String; 7] {
    [
        result
            .timestamp
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string(),
        result.service_name.clone(),
        result.status.as_str().to_string(),
        result.latency_ms.to_string(),
        result.http_status_code.to_string(),
        result.failure_reason.clone(),
        result.correlation_id.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PersistedStatus;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample_result(reason: &str) -> HealthCheckResult {
        HealthCheckResult {
            service_name: "api".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap(),
            method: "GET".to_string(),
            status: if reason.is_empty() {
                PersistedStatus::Pass
            } else {
                PersistedStatus::Fail
            },
            latency_ms: 120,
            http_status_code: if reason.is_empty() { 200 } else { 0 },
            expected_status: 200,
            text_validation_result: None,
            header_validation_result: None,
            failure_reason: reason.to_string(),
            correlation_id: "11111111-1111-1111-1111-111111111111".to_string(),
        }
    }

    #[test]
    fn writes_header_exactly_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(&path);

        writer.append(&sample_result("")).unwrap();
        writer.append(&sample_result("")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content.matches(CSV_HEADER).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn escapes_fields_containing_commas_and_quotes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(&path);

        writer
            .append(&sample_result("Expected text \"OK, fine\" not found"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let data_line = content.lines().nth(1).unwrap();
        assert!(data_line.contains("\"Expected text \"\"OK, fine\"\" not found\""));
    }

    #[test]
    fn append_batch_writes_all_records_in_one_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(&path);

        let results = vec![sample_result(""), sample_result("Connection timeout")];
        writer.append_batch(&results).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn timestamp_format_is_iso8601_with_milliseconds() {
        let result = sample_result("");
        let fields = record_fields(&result);
        assert_eq!(fields[0], "2026-07-27T12:00:00.000Z");
    }
}
