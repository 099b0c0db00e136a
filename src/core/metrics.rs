//! Metrics Registry: the eight pull-based Prometheus metrics the core
//! publishes. Built directly on the `prometheus` crate rather than the
//! macro-based `metrics` facade some sibling examples use, since this
//! registry is a single process-wide singleton with a known, closed metric
//! set rather than an open-ended instrumentation surface.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramVec, Opts, Registry,
};

use crate::core::errors::ErrorKind;
use crate::core::types::PersistedStatus;

/// Latency histogram buckets, in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

pub struct Metrics {
    registry: Registry,
    health_checks_total: CounterVec,
    health_check_latency_seconds: HistogramVec,
    services_failing: Gauge,
    health_check_errors_total: CounterVec,
    worker_pool_size: Gauge,
    worker_tasks_completed_total: Counter,
    csv_writes_total: CounterVec,
    csv_records_written_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let health_checks_total = CounterVec::new(
            Opts::new(
                "health_checks_total",
                "Total number of completed health check probes",
            ),
            &["service_name", "status"],
        )?;

        let health_check_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "health_check_latency_seconds",
                "Observed probe latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["service_name"],
        )?;

        let services_failing = Gauge::new(
            "services_failing",
            "Number of services currently in FAIL status",
        )?;

        let health_check_errors_total = CounterVec::new(
            Opts::new(
                "health_check_errors_total",
                "Total number of classified probe errors",
            ),
            &["service_name", "error_type"],
        )?;

        let worker_pool_size = Gauge::new("worker_pool_size", "Configured worker pool size")?;

        let worker_tasks_completed_total = Counter::new(
            "worker_tasks_completed_total",
            "Total number of worker jobs completed",
        )?;

        let csv_writes_total = CounterVec::new(
            Opts::new("csv_writes_total", "Total number of CSV write attempts"),
            &["status"],
        )?;

        let csv_records_written_total = Counter::new(
            "csv_records_written_total",
            "Total number of CSV records appended",
        )?;

        registry.register(Box::new(health_checks_total.clone()))?;
        registry.register(Box::new(health_check_latency_seconds.clone()))?;
        registry.register(Box::new(services_failing.clone()))?;
        registry.register(Box::new(health_check_errors_total.clone()))?;
        registry.register(Box::new(worker_pool_size.clone()))?;
        registry.register(Box::new(worker_tasks_completed_total.clone()))?;
        registry.register(Box::new(csv_writes_total.clone()))?;
        registry.register(Box::new(csv_records_written_total.clone()))?;

        Ok(Self {
            registry,
            health_checks_total,
            health_check_latency_seconds,
            services_failing,
            health_check_errors_total,
            worker_pool_size,
            worker_tasks_completed_total,
            csv_writes_total,
            csv_records_written_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed probe cycle: increments the total counter once for
    /// the persisted (final) outcome, observes its latency (ms -> s), and
    /// increments the error counter once per attempt made (`attempts`) when
    /// the final outcome is a failure carrying a classifiable transport
    /// error, so a retried probe's error count reflects every attempt, not
    /// just the one that was persisted.
    pub fn record_probe(
        &self,
        service_name: &str,
        status: PersistedStatus,
        latency_ms: u64,
        error_kind: Option<ErrorKind>,
        attempts: u32,
    ) {
        self.health_checks_total
            .with_label_values(&[service_name, status.as_str()])
            .inc();
        self.health_check_latency_seconds
            .with_label_values(&[service_name])
            .observe(latency_ms as f64 / 1000.0);

        if let Some(kind) = error_kind {
            self.health_check_errors_total
                .with_label_values(&[service_name, kind.as_str()])
                .inc_by(attempts.max(1) as f64);
        }
    }

    /// Update the failing-services gauge at snapshot time.
    pub fn set_services_failing(&self, count: usize) {
        self.services_failing.set(count as f64);
    }

    pub fn set_worker_pool_size(&self, size: usize) {
        self.worker_pool_size.set(size as f64);
    }

    /// Record one worker job's completion, counting every attempt the retry
    /// controller made (not just the persisted final result), so a timed-out
    /// probe retried twice shows up as three completions.
    pub fn record_worker_completion(&self, attempts: u32) {
        self.worker_tasks_completed_total.inc_by(attempts.max(1) as f64);
    }

    pub fn record_csv_write(&self, success: bool, records_written: u64) {
        let label = if success { "success" } else { "failure" };
        self.csv_writes_total.with_label_values(&[label]).inc();
        if success {
            self.csv_records_written_total.inc_by(records_written as f64);
        }
    }
}
