//! Status lattice, runtime state, and probe result types shared across the
//! core. `ProbeMetrics` carries raw timing/transport facts, while
//! `HealthCheckResult` and `ServiceRuntime` are the two persisted/live views
//! built from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The four-valued status lattice, ordered FAIL < DEGRADED < PASS < PENDING
/// so a derived `Ord` gives the snapshot's sort order directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Fail,
    Degraded,
    Pass,
    Pending,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Pass => "PASS",
            Status::Degraded => "DEGRADED",
            Status::Fail => "FAIL",
        }
    }

    /// Coerce a runtime-only PENDING into FAIL: persisted records never carry a pending status.
    pub fn for_persistence(&self) -> PersistedStatus {
        match self {
            Status::Pending => PersistedStatus::Fail,
            Status::Pass => PersistedStatus::Pass,
            Status::Degraded => PersistedStatus::Degraded,
            Status::Fail => PersistedStatus::Fail,
        }
    }
}

/// The subset of the lattice valid on a persisted `HealthCheckResult`: no PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistedStatus {
    Fail,
    Degraded,
    Pass,
}

impl PersistedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistedStatus::Pass => "PASS",
            PersistedStatus::Degraded => "DEGRADED",
            PersistedStatus::Fail => "FAIL",
        }
    }
}

/// Raw timing/transport facts produced by a single probe attempt, before
/// validation clauses are folded into a status verdict.
#[derive(Debug, Clone)]
pub struct ProbeMetrics {
    pub latency_ms: u64,
    pub http_status_code: u16,
    pub body_prefix: Vec<u8>,
    pub response_headers: HashMap<String, String>,
    pub transport_error: Option<String>,
}

/// Mutable per-service runtime state, owned exclusively by the Orchestrator.
#[derive(Debug, Clone)]
pub struct ServiceRuntime {
    pub current_status: Status,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_http_status: Option<u16>,
    pub last_failure_reason: String,
}

impl ServiceRuntime {
    pub fn new_pending() -> Self {
        Self {
            current_status: Status::Pending,
            last_check_time: None,
            last_latency_ms: None,
            consecutive_failures: 0,
            last_http_status: None,
            last_failure_reason: String::new(),
        }
    }

    /// Apply a freshly computed `HealthCheckResult`, updating consecutive
    /// failure tracking.
    pub fn apply_result(&mut self, result: &HealthCheckResult) {
        self.current_status = match result.status {
            PersistedStatus::Pass => Status::Pass,
            PersistedStatus::Degraded => Status::Degraded,
            PersistedStatus::Fail => Status::Fail,
        };
        self.last_check_time = Some(result.timestamp);
        self.last_latency_ms = Some(result.latency_ms);
        self.last_http_status = Some(result.http_status_code);
        self.last_failure_reason = result.failure_reason.clone();

        if matches!(result.status, PersistedStatus::Fail) {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        } else {
            self.consecutive_failures = 0;
        }
    }

    /// Flap suppression: visually DOWN only once FAIL has been the verdict
    /// for two consecutive probes, so a single transient failure doesn't
    /// flip the displayed status.
    pub fn is_visually_down(&self) -> bool {
        matches!(self.current_status, Status::Fail) && self.consecutive_failures >= 2
    }
}

/// Immutable outcome record for a single completed probe cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub status: PersistedStatus,
    pub latency_ms: u64,
    pub http_status_code: u16,
    pub expected_status: i64,
    pub text_validation_result: Option<bool>,
    pub header_validation_result: Option<HashMap<String, bool>>,
    pub failure_reason: String,
    pub correlation_id: String,
}

impl HealthCheckResult {
    /// `failure_reason` is empty exactly when status is PASS, never otherwise.
    pub fn invariant_holds(&self) -> bool {
        self.failure_reason.is_empty() == matches!(self.status, PersistedStatus::Pass)
    }
}
