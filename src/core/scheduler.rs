//! Scheduler / Orchestrator: the control plane. Owns the `ServiceRuntime`
//! map, fires one tick per service on its own interval (randomized initial
//! spread to avoid a thundering herd), enqueues jobs to the `WorkerPool`,
//! and folds every result back into runtime state, CSV history, metrics and
//! a debounced snapshot rewrite.
//!
//! N independent per-service tickers feed one shared worker pool and one
//! single-owner runtime map: exactly one component ever writes the
//! published snapshot and history file, so there is no cross-task locking
//! to reason about.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{GlobalSettings, ServiceDefinition};
use crate::core::errors::classify_transport_error;
use crate::core::history::HistoryWriter;
use crate::core::metrics::Metrics;
use crate::core::pool::{Job, WorkerPool};
use crate::core::snapshot::{build_snapshot, SnapshotWriter};
use crate::core::types::{HealthCheckResult, ServiceRuntime, Status};
use crate::logging::Logger;

/// Coalesces a burst of results that land within this window into a single
/// snapshot rewrite.
const SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Grace period given to in-flight jobs to finish when cancellation fires.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Orchestrator {
    services: Vec<ServiceDefinition>,
    settings: GlobalSettings,
    runtimes: HashMap<String, ServiceRuntime>,
    pool: WorkerPool,
    history: HistoryWriter,
    snapshot: SnapshotWriter,
    metrics: Arc<Metrics>,
    logger: Logger,
}

impl Orchestrator {
    pub fn new(
        services: Vec<ServiceDefinition>,
        settings: GlobalSettings,
        pool: WorkerPool,
        history: HistoryWriter,
        snapshot: SnapshotWriter,
        metrics: Arc<Metrics>,
        logger: Logger,
    ) -> Self {
        let runtimes = services
            .iter()
            .map(|s| (s.name.clone(), ServiceRuntime::new_pending()))
            .collect();

        metrics.set_worker_pool_size(pool.size());

        Self {
            services,
            settings,
            runtimes,
            pool,
            history,
            snapshot,
            metrics,
            logger,
        }
    }

    /// Run until `cancellation` fires: generate per-service ticks, drain
    /// results, and publish the final snapshot before returning.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<String>(self.services.len().max(1));
        let mut in_flight: std::collections::HashSet<String> = std::collections::HashSet::new();

        let tick_handles: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                spawn_ticker(
                    service.name.clone(),
                    service.effective_interval(&self.settings),
                    tick_tx.clone(),
                    cancellation.clone(),
                )
            })
            .collect();
        drop(tick_tx);

        let mut pending_snapshot = false;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                Some(service_name) = tick_rx.recv() => {
                    if in_flight.contains(&service_name) {
                        // A prior job for this service is still running;
                        // drop this tick (at-most-one-in-flight per service).
                        continue;
                    }
                    if let Some(service) = self.services.iter().find(|s| s.name == service_name).cloned() {
                        in_flight.insert(service_name.clone());
                        let job = Job {
                            effective_timeout_ms: service.effective_timeout_ms(&self.settings),
                            effective_warning_threshold_ms: service.effective_warning_threshold_ms(&self.settings),
                            max_retries: self.settings.max_retries,
                            service,
                        };
                        if self.pool.submit(job).await.is_err() {
                            in_flight.remove(&service_name);
                        }
                    }
                }
                Some(result) = self.pool.recv_result() => {
                    in_flight.remove(&result.service_name);
                    self.metrics.record_worker_completion(result.outcome.attempts);
                    self.handle_result(result.service_name, result.outcome.result, result.outcome.attempts).await;
                    pending_snapshot = true;
                }
                _ = tokio::time::sleep(SNAPSHOT_DEBOUNCE), if pending_snapshot => {
                    self.publish_snapshot().await;
                    pending_snapshot = false;
                }
            }
        }

        for handle in tick_handles {
            handle.abort();
        }

        // No new jobs are submitted past this point; drain whatever is
        // already in flight within the grace period so their results still
        // land in history/runtime state before the final snapshot.
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !in_flight.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    self.logger.warn(
                        "scheduler",
                        "shutdown grace period elapsed with jobs still in flight; discarding",
                        None,
                        serde_json::json!({"remaining": in_flight.len()}),
                    );
                    break;
                }
                Some(result) = self.pool.recv_result() => {
                    in_flight.remove(&result.service_name);
                    self.metrics.record_worker_completion(result.outcome.attempts);
                    self.handle_result(result.service_name, result.outcome.result, result.outcome.attempts).await;
                }
            }
        }

        self.publish_snapshot().await;
    }

    async fn handle_result(&mut self, service_name: String, result: HealthCheckResult, attempts: u32) {
        let error_kind = if result.failure_reason.is_empty() {
            None
        } else {
            Some(classify_transport_error(&result.failure_reason))
        };
        self.metrics.record_probe(
            &service_name,
            result.status,
            result.latency_ms,
            error_kind,
            attempts,
        );

        self.logger.info(
            "scheduler",
            "probe completed",
            Some(&result.correlation_id),
            serde_json::json!({
                "service": service_name,
                "status": result.status.as_str(),
                "latency_ms": result.latency_ms,
            }),
        );

        if let Err(err) = self.history.append(&result) {
            self.metrics.record_csv_write(false, 0);
            self.logger.error(
                "history",
                &format!("failed to append history record: {err}"),
                Some(&result.correlation_id),
                serde_json::json!({"service": service_name}),
            );
        } else {
            self.metrics.record_csv_write(true, 1);
        }

        if let Some(runtime) = self.runtimes.get_mut(&service_name) {
            runtime.apply_result(&result);
        }
    }

    async fn publish_snapshot(&self) {
        let entries = build_snapshot(&self.services, &self.runtimes);
        let failing = entries
            .iter()
            .filter(|e| e.status == Status::Fail.as_str())
            .count();
        self.metrics.set_services_failing(failing);

        if let Err(err) = self.snapshot.write(&entries).await {
            self.logger.error(
                "snapshot",
                &format!("failed to write snapshot: {err}"),
                None,
                serde_json::json!({}),
            );
        }
    }
}

fn spawn_ticker(
    service_name: String,
    interval_secs: u64,
    tick_tx: mpsc::Sender<String>,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let initial_jitter_ms = rand::thread_rng().gen_range(0..500);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(initial_jitter_ms)) => {}
            _ = cancellation.cancelled() => return,
        }

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if tick_tx.send(service_name.clone()).await.is_err() {
                        break;
                    }
                }
                _ = cancellation.cancelled() => break,
            }
        }
    })
}
