//! Snapshot Publisher: writes the current-status JSON array consumed by the
//! page renderer. Publication is atomic: a temp file is written and renamed
//! over the target path so a reader never observes a partial write.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::ServiceDefinition;
use crate::core::types::{ServiceRuntime, Status};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write temp snapshot file {path}: {source}")]
    WriteTemp {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename temp snapshot file into place: {0}")]
    Rename(#[source] std::io::Error),
}

/// One element of the published snapshot array. Field presence/semantics,
/// not key order, is the contract.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub status: String,
    pub latency_ms: Option<u64>,
    pub last_check_time: Option<String>,
    pub tags: Vec<String>,
    pub http_status_code: Option<u16>,
    pub failure_reason: String,
}

/// Build the sorted, null-projected snapshot array from the service
/// definitions (for stable declaration order and tags) and the live
/// runtime map. Pending services project `null` for latency/check-time/
/// http-status; sort order is FAIL, then DEGRADED, then PASS, then PENDING,
/// preserving declaration order within each bucket.
pub fn build_snapshot(
    services: &[ServiceDefinition],
    runtimes: &std::collections::HashMap<String, ServiceRuntime>,
) -> Vec<SnapshotEntry> {
    let mut entries: Vec<(usize, Status, SnapshotEntry)> = services
        .iter()
        .enumerate()
        .filter_map(|(index, service)| {
            let runtime = runtimes.get(&service.name)?;
            let is_pending = matches!(runtime.current_status, Status::Pending);
            let display = display_status(runtime);

            let entry = SnapshotEntry {
                name: service.name.clone(),
                status: display.as_str().to_string(),
                latency_ms: if is_pending {
                    None
                } else {
                    runtime.last_latency_ms
                },
                last_check_time: if is_pending {
                    None
                } else {
                    runtime.last_check_time.map(|t| t.to_rfc3339())
                },
                tags: service.tags.clone(),
                http_status_code: if is_pending {
                    None
                } else {
                    runtime.last_http_status
                },
                failure_reason: runtime.last_failure_reason.clone(),
            };

            Some((index, display, entry))
        })
        .collect();

    // Stable sort by lattice order (FAIL < DEGRADED < PASS < PENDING),
    // preserving configuration declaration order within each bucket.
    entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    entries.into_iter().map(|(_, _, entry)| entry).collect()
}

/// Derive the user-facing lattice value from runtime state: a single FAIL
/// is not yet surfaced as DOWN, so until `consecutive_failures` reaches 2
/// the published status stays DEGRADED. `ServiceRuntime::current_status`
/// keeps the raw probe verdict; only the snapshot projection applies this
/// flap suppression.
fn display_status(runtime: &ServiceRuntime) -> Status {
    if matches!(runtime.current_status, Status::Fail) && !runtime.is_visually_down() {
        Status::Degraded
    } else {
        runtime.current_status
    }
}

pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and atomically publish the snapshot: write to a sibling
    /// `.tmp` file, then rename over the target path so readers never
    /// observe a partially written file.
    pub async fn write(&self, entries: &[SnapshotEntry]) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SnapshotError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|source| SnapshotError::WriteTemp {
                path: temp_path.display().to_string(),
                source,
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(SnapshotError::Rename)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Expected, Method, Protocol};
    use crate::core::types::{HealthCheckResult, PersistedStatus};
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn service(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            protocol: Protocol::Https,
            method: Method::Get,
            resource: "https://example.com".to_string(),
            tags: vec!["prod".to_string()],
            expected: Expected {
                status: 200,
                text: None,
                headers: None,
            },
            headers: vec![],
            payload: None,
            interval: None,
            warning_threshold: None,
            timeout: None,
            skip_validation: false,
        }
    }

    fn runtime_with_status(status: Status) -> ServiceRuntime {
        let mut runtime = ServiceRuntime::new_pending();
        if !matches!(status, Status::Pending) {
            let persisted = match status {
                Status::Pass => PersistedStatus::Pass,
                Status::Degraded => PersistedStatus::Degraded,
                _ => PersistedStatus::Fail,
            };
            runtime.apply_result(&HealthCheckResult {
                service_name: "x".into(),
                timestamp: Utc::now(),
                method: "GET".into(),
                status: persisted,
                latency_ms: 42,
                http_status_code: 200,
                expected_status: 200,
                text_validation_result: None,
                header_validation_result: None,
                failure_reason: if matches!(status, Status::Pass) {
                    String::new()
                } else {
                    "failed".into()
                },
                correlation_id: "00000000-0000-0000-0000-000000000000".into(),
            });
        }
        runtime
    }

    #[test]
    fn pending_services_project_nulls() {
        let services = vec![service("a")];
        let mut runtimes = HashMap::new();
        runtimes.insert("a".to_string(), ServiceRuntime::new_pending());

        let snapshot = build_snapshot(&services, &runtimes);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].latency_ms.is_none());
        assert!(snapshot[0].last_check_time.is_none());
        assert!(snapshot[0].http_status_code.is_none());
    }

    #[test]
    fn non_pending_services_project_values() {
        let services = vec![service("a")];
        let mut runtimes = HashMap::new();
        runtimes.insert("a".to_string(), runtime_with_status(Status::Pass));

        let snapshot = build_snapshot(&services, &runtimes);
        assert!(snapshot[0].latency_ms.is_some());
        assert!(snapshot[0].http_status_code.is_some());
    }

    #[test]
    fn sort_order_is_fail_degraded_pass_pending() {
        let services = vec![
            service("pending-svc"),
            service("pass-svc"),
            service("degraded-svc"),
            service("fail-svc"),
        ];
        let mut runtimes = HashMap::new();
        runtimes.insert("pending-svc".to_string(), runtime_with_status(Status::Pending));
        runtimes.insert("pass-svc".to_string(), runtime_with_status(Status::Pass));
        runtimes.insert("degraded-svc".to_string(), runtime_with_status(Status::Degraded));
        runtimes.insert("fail-svc".to_string(), runtime_with_status(Status::Fail));

        let snapshot = build_snapshot(&services, &runtimes);
        let order: Vec<&str> = snapshot.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(order, vec!["FAIL", "DEGRADED", "PASS", "PENDING"]);
    }

    #[test]
    fn single_failure_displays_degraded_not_fail() {
        let services = vec![service("a")];
        let mut runtimes = HashMap::new();
        let mut runtime = ServiceRuntime::new_pending();
        runtime.apply_result(&HealthCheckResult {
            service_name: "a".into(),
            timestamp: Utc::now(),
            method: "GET".into(),
            status: PersistedStatus::Fail,
            latency_ms: 10,
            http_status_code: 0,
            expected_status: 200,
            text_validation_result: None,
            header_validation_result: None,
            failure_reason: "Connection timeout".into(),
            correlation_id: "00000000-0000-0000-0000-000000000000".into(),
        });
        assert_eq!(runtime.consecutive_failures, 1);
        runtimes.insert("a".to_string(), runtime);

        let snapshot = build_snapshot(&services, &runtimes);
        assert_eq!(snapshot[0].status, "DEGRADED");
    }

    #[test]
    fn second_consecutive_failure_displays_fail() {
        let services = vec![service("a")];
        let mut runtimes = HashMap::new();
        let mut runtime = ServiceRuntime::new_pending();
        for _ in 0..2 {
            runtime.apply_result(&HealthCheckResult {
                service_name: "a".into(),
                timestamp: Utc::now(),
                method: "GET".into(),
                status: PersistedStatus::Fail,
                latency_ms: 10,
                http_status_code: 0,
                expected_status: 200,
                text_validation_result: None,
                header_validation_result: None,
                failure_reason: "Connection timeout".into(),
                correlation_id: "00000000-0000-0000-0000-000000000000".into(),
            });
        }
        assert_eq!(runtime.consecutive_failures, 2);
        runtimes.insert("a".to_string(), runtime);

        let snapshot = build_snapshot(&services, &runtimes);
        assert_eq!(snapshot[0].status, "FAIL");
    }

    #[tokio::test]
    async fn write_is_atomic_and_readable_afterward() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let writer = SnapshotWriter::new(&path);

        let services = vec![service("a")];
        let mut runtimes = HashMap::new();
        runtimes.insert("a".to_string(), runtime_with_status(Status::Pass));
        let snapshot = build_snapshot(&services, &runtimes);

        writer.write(&snapshot).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }
}
