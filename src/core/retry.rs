//! Retry Controller: wraps a single probe attempt with bounded exponential
//! backoff, gated by the error classifier's retryability verdict.

use std::time::Duration;

use crate::core::errors::classify_transport_error;
use crate::core::probe::{execute_probe, HttpTransport};
use crate::config::ServiceDefinition;
use crate::core::types::{HealthCheckResult, PersistedStatus};

const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 5_000;

/// Outcome of the retry loop: the final attempt's result plus the number of
/// attempts made (for metrics; only the final result is persisted, per the
/// "only the final attempt persists" design decision).
pub struct RetryOutcome {
    pub result: HealthCheckResult,
    pub attempts: u32,
}

/// Run the probe up to `max_retries` additional times while the classified
/// failure is retryable. Backoff doubles each attempt starting from
/// `BASE_BACKOFF_MS`, capped at `MAX_BACKOFF_MS`, with up to ±20% jitter.
pub async fn run_with_retries(
    transport: &dyn HttpTransport,
    service: &ServiceDefinition,
    timeout_ms: u64,
    warning_threshold_ms: u64,
    max_retries: u32,
) -> RetryOutcome {
    let mut attempt: u32 = 0;
    let mut last = execute_probe(transport, service, timeout_ms, warning_threshold_ms).await;

    while attempt < max_retries {
        if !matches!(last.status, PersistedStatus::Fail) {
            break;
        }
        if !is_retryable(&last.failure_reason) {
            break;
        }

        let delay = backoff_with_jitter(attempt);
        tokio::time::sleep(delay).await;

        attempt += 1;
        last = execute_probe(transport, service, timeout_ms, warning_threshold_ms).await;
    }

    RetryOutcome {
        result: last,
        attempts: attempt + 1,
    }
}

fn is_retryable(failure_reason: &str) -> bool {
    if failure_reason.is_empty() {
        return false;
    }
    classify_transport_error(failure_reason).is_retryable()
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
    let base = BASE_BACKOFF_MS.saturating_mul(factor);
    let delay = base.min(MAX_BACKOFF_MS);
    let jitter_range = (delay as f64 * 0.2) as u64;
    let jitter = if jitter_range == 0 {
        0
    } else {
        rand::random::<u64>() % (jitter_range * 2 + 1)
    };
    // jitter centered around 0: delay - jitter_range ..= delay + jitter_range
    let signed = delay as i64 - jitter_range as i64 + jitter as i64;
    Duration::from_millis(signed.max(0) as u64)
}
