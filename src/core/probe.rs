//! Probe Engine: executes exactly one HTTP attempt against a service and
//! folds the response (or transport failure) into a `HealthCheckResult`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::io::AsyncReadExt;
use isahc::config::{Configurable, RedirectPolicy};
use isahc::{HttpClient, Request};
use uuid::Uuid;

use crate::config::{Expected, Method, ServiceDefinition};
use crate::core::errors::classify_transport_error;
use crate::core::guard;
use crate::core::types::{HealthCheckResult, PersistedStatus, ProbeMetrics};

/// Response body is capped at 100 KiB: a correctness contract for text-match
/// semantics as much as a DoS guard.
pub const MAX_BODY_BYTES: usize = 100 * 1024;

/// HTTP transport abstraction so the probe engine is testable without a
/// socket: tests inject a fake implementation, production wires `IsahcTransport`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<TransportResponse, String>;
}

pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body_prefix: Vec<u8>,
}

/// Production transport backed by isahc, with redirects surfaced to
/// validation rather than auto-followed and the response body capped at
/// `MAX_BODY_BYTES`.
pub struct IsahcTransport {
    client: HttpClient,
}

impl IsahcTransport {
    pub fn new() -> Result<Self, isahc::Error> {
        let client = HttpClient::builder()
            .redirect_policy(RedirectPolicy::None)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for IsahcTransport {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<TransportResponse, String> {
        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .timeout(timeout);

        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request = builder
            .body(body.unwrap_or_default())
            .map_err(|e| format!("request build failed: {e}"))?;

        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();

        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                response_headers.insert(name.to_string(), value_str.to_string());
            }
        }

        // Read at most MAX_BODY_BYTES; the rest of the body, if any, is left
        // unread and dropped along with the response.
        let mut buf = vec![0u8; MAX_BODY_BYTES];
        let mut filled = 0;
        let body = response.body_mut();
        while filled < buf.len() {
            let n = body
                .read(&mut buf[filled..])
                .await
                .map_err(|e| format!("body read failed: {e}"))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        Ok(TransportResponse {
            status,
            headers: response_headers,
            body_prefix: buf,
        })
    }
}

/// Execute one probe attempt for `service`, returning the persisted result.
/// `timeout_ms` and `warning_threshold_ms` are the effective, per-service
/// values already resolved from global defaults.
pub async fn execute_probe(
    transport: &dyn HttpTransport,
    service: &ServiceDefinition,
    timeout_ms: u64,
    warning_threshold_ms: u64,
) -> HealthCheckResult {
    let correlation_id = Uuid::new_v4().to_string();
    let timestamp = Utc::now();

    let validated_url = match guard::validate_url_for_service(&service.resource, service.skip_validation) {
        Ok(url) => url,
        Err(err) => {
            return fail_result(
                service,
                timestamp,
                &correlation_id,
                0,
                err.to_string(),
                0,
            );
        }
    };

    let start = Instant::now();
    let method = service.method.as_str();
    let body = match (service.method, &service.payload) {
        (Method::Post, Some(payload)) => serde_json::to_vec(payload).ok(),
        _ => None,
    };

    let result = transport
        .execute(
            method,
            validated_url.as_str(),
            &service.headers,
            body,
            Duration::from_millis(timeout_ms),
        )
        .await;

    let latency_ms = start.elapsed().as_millis() as u64;

    let metrics = match result {
        Ok(response) => ProbeMetrics {
            latency_ms,
            http_status_code: response.status,
            body_prefix: response.body_prefix,
            response_headers: response.headers,
            transport_error: None,
        },
        Err(message) => ProbeMetrics {
            latency_ms,
            http_status_code: 0,
            body_prefix: Vec::new(),
            response_headers: HashMap::new(),
            transport_error: Some(message),
        },
    };

    build_result(
        service,
        timestamp,
        &correlation_id,
        metrics,
        timeout_ms,
        warning_threshold_ms,
    )
}

fn build_result(
    service: &ServiceDefinition,
    timestamp: chrono::DateTime<Utc>,
    correlation_id: &str,
    metrics: ProbeMetrics,
    timeout_ms: u64,
    warning_threshold_ms: u64,
) -> HealthCheckResult {
    if let Some(transport_error) = &metrics.transport_error {
        let kind = classify_transport_error(transport_error);
        let reason = if metrics.latency_ms >= timeout_ms {
            "Connection timeout".to_string()
        } else {
            transport_reason(kind)
        };
        return fail_result(
            service,
            timestamp,
            correlation_id,
            0,
            reason,
            metrics.latency_ms,
        );
    }

    let text_validation_result = service
        .expected
        .text
        .as_ref()
        .map(|needle| body_contains(&metrics.body_prefix, needle));

    let header_validation_result = service.expected.headers.as_ref().map(|expected_headers| {
        expected_headers
            .iter()
            .map(|(name, expected_value)| {
                let matched = metrics
                    .response_headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v == expected_value)
                    .unwrap_or(false);
                (name.clone(), matched)
            })
            .collect::<HashMap<_, _>>()
    });

    let failure_reason = determine_failure_reason(
        &service.expected,
        metrics.http_status_code,
        text_validation_result,
        header_validation_result.as_ref(),
        metrics.latency_ms,
        timeout_ms,
    );

    let status = if !failure_reason.is_empty() || metrics.latency_ms > timeout_ms {
        PersistedStatus::Fail
    } else if metrics.latency_ms > warning_threshold_ms {
        PersistedStatus::Degraded
    } else {
        PersistedStatus::Pass
    };

    let failure_reason = if matches!(status, PersistedStatus::Pass) {
        String::new()
    } else if failure_reason.is_empty() && metrics.latency_ms > timeout_ms {
        "Connection timeout".to_string()
    } else {
        failure_reason
    };

    HealthCheckResult {
        service_name: service.name.clone(),
        timestamp,
        method: service.method.as_str().to_string(),
        status,
        latency_ms: metrics.latency_ms,
        http_status_code: metrics.http_status_code,
        expected_status: service.expected.status,
        text_validation_result,
        header_validation_result,
        failure_reason,
        correlation_id: correlation_id.to_string(),
    }
}

fn determine_failure_reason(
    expected: &Expected,
    actual_status: u16,
    text_result: Option<bool>,
    header_result: Option<&HashMap<String, bool>>,
    latency_ms: u64,
    timeout_ms: u64,
) -> String {
    if latency_ms > timeout_ms {
        return "Connection timeout".to_string();
    }

    if actual_status as i64 != expected.status {
        return format!(
            "Expected status {}, got {}",
            expected.status, actual_status
        );
    }

    if let (Some(false), Some(needle)) = (text_result, &expected.text) {
        return format!("Expected text '{needle}' not found");
    }

    if let Some(results) = header_result {
        for (name, matched) in results {
            if !*matched {
                let expected_value = expected
                    .headers
                    .as_ref()
                    .and_then(|h| h.get(name))
                    .cloned()
                    .unwrap_or_default();
                return format!("Expected header '{name}' value '{expected_value}' not found");
            }
        }
    }

    String::new()
}

fn body_contains(body_prefix: &[u8], needle: &str) -> bool {
    let haystack = String::from_utf8_lossy(body_prefix);
    haystack.contains(needle)
}

fn transport_reason(kind: crate::core::errors::ErrorKind) -> String {
    use crate::core::errors::ErrorKind;
    match kind {
        ErrorKind::Timeout => "Connection timeout".to_string(),
        ErrorKind::DnsFailure => "DNS failure".to_string(),
        ErrorKind::ConnectionRefused => "Connection refused".to_string(),
        ErrorKind::SslTls => "SSL/TLS certificate error".to_string(),
        ErrorKind::Network => "Network error".to_string(),
        ErrorKind::Unknown => "Unknown transport error".to_string(),
    }
}

fn fail_result(
    service: &ServiceDefinition,
    timestamp: chrono::DateTime<Utc>,
    correlation_id: &str,
    http_status_code: u16,
    failure_reason: String,
    latency_ms: u64,
) -> HealthCheckResult {
    HealthCheckResult {
        service_name: service.name.clone(),
        timestamp,
        method: service.method.as_str().to_string(),
        status: PersistedStatus::Fail,
        latency_ms,
        http_status_code,
        expected_status: service.expected.status,
        text_validation_result: None,
        header_validation_result: None,
        failure_reason,
        correlation_id: correlation_id.to_string(),
    }
}
