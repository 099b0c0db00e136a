//! Worker Pool: bounded-concurrency executor for probe jobs.
//!
//! Generalizes the `Semaphore` + `buffer_unordered` pattern into an explicit
//! job-queue/result-channel shape: the Orchestrator needs to keep submitting
//! jobs across ticks while draining results independently, which a single
//! `buffer_unordered` call cannot express once the producer side is a
//! long-lived loop rather than a one-shot batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use crate::config::ServiceDefinition;
use crate::core::retry::{run_with_retries, RetryOutcome};
use crate::core::probe::HttpTransport;

/// One unit of work submitted to the pool.
pub struct Job {
    pub service: ServiceDefinition,
    pub effective_timeout_ms: u64,
    pub effective_warning_threshold_ms: u64,
    pub max_retries: u32,
}

/// A completed job's outcome, tagged with the service name for routing by
/// the Orchestrator.
pub struct JobResult {
    pub service_name: String,
    pub outcome: RetryOutcome,
}

/// Bounded worker pool. Cloning the handle is cheap; every clone shares the
/// same job queue, semaphore and result sender.
#[derive(Clone)]
pub struct WorkerPool {
    job_tx: mpsc::Sender<Job>,
    result_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobResult>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` worker tasks reading from a bounded job queue (capacity
    /// `size * 4`, matching the pack's queue-depth convention of a small
    /// multiple of worker count) and writing to a shared result channel.
    pub fn spawn(size: usize, transport: Arc<dyn HttpTransport>) -> Self {
        let queue_capacity = (size * 4).max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue_capacity);
        let (result_tx, result_rx) = mpsc::channel::<JobResult>(queue_capacity);

        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let semaphore = Arc::new(Semaphore::new(size));

        for _ in 0..size {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let transport = Arc::clone(&transport);

            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };

                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    let outcome = run_with_retries(
                        transport.as_ref(),
                        &job.service,
                        job.effective_timeout_ms,
                        job.effective_warning_threshold_ms,
                        job.max_retries,
                    )
                    .await;

                    let result = JobResult {
                        service_name: job.service.name.clone(),
                        outcome,
                    };
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }

        Self {
            job_tx,
            result_rx: Arc::new(tokio::sync::Mutex::new(result_rx)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit a job. Blocks (async) when the queue is full; this is the
    /// pool's backpressure mechanism.
    pub async fn submit(&self, job: Job) -> Result<(), Job> {
        self.job_tx.send(job).await.map_err(|e| e.0)
    }

    /// Receive the next completed job result.
    pub async fn recv_result(&self) -> Option<JobResult> {
        let mut rx = self.result_rx.lock().await;
        rx.recv().await
    }

    /// Close the job queue and wait up to `grace` for in-flight jobs to
    /// finish. Queued-but-unstarted jobs are discarded once the sender is
    /// dropped; callers should log the discard count themselves using the
    /// return value.
    pub async fn shutdown(self, grace: Duration) {
        drop(self.job_tx);
        let _ = tokio::time::timeout(grace, async {
            // Drain whatever results still arrive within the grace period;
            // callers that need the values should drain via recv_result
            // before calling shutdown.
            let mut rx = self.result_rx.lock().await;
            while rx.recv().await.is_some() {}
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Expected, Method, Protocol};
    use crate::core::probe::TransportResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct AlwaysPass;

    #[async_trait]
    impl HttpTransport for AlwaysPass {
        async fn execute(
            &self,
            _method: &str,
            _url: &str,
            _headers: &[(String, String)],
            _body: Option<Vec<u8>>,
            _timeout: Duration,
        ) -> Result<TransportResponse, String> {
            Ok(TransportResponse {
                status: 200,
                headers: HashMap::new(),
                body_prefix: Vec::new(),
            })
        }
    }

    fn service(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            protocol: Protocol::Https,
            method: Method::Get,
            resource: "https://example.com/health".to_string(),
            tags: vec![],
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

    #[tokio::test]
    async fn pool_processes_submitted_jobs() {
        let pool = WorkerPool::spawn(2, Arc::new(AlwaysPass));

        for i in 0..4 {
            pool.submit(Job {
                service: service(&format!("svc-{i}")),
                effective_timeout_ms: 1000,
                effective_warning_threshold_ms: 500,
                max_retries: 0,
            })
            .await
            .unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let result = pool.recv_result().await.expect("result");
            seen.insert(result.service_name);
        }
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn pool_reports_size() {
        let pool = WorkerPool::spawn(3, Arc::new(AlwaysPass));
        assert_eq!(pool.size(), 3);
    }
}
