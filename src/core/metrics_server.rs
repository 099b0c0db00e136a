//! `/metrics` exposition endpoint. Structure follows the pack's axum +
//! `prometheus::TextEncoder` exporter pattern: a tiny state-carrying router
//! with one GET route for the scrape target, separate from the run loop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};

use crate::core::metrics::Metrics;

pub async fn metrics_handler(
    State(metrics): State<Arc<Metrics>>,
) -> Result<impl IntoResponse, MetricsServerError> {
    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| MetricsServerError::Encoding(e.to_string()))?;

    let body = String::from_utf8(buffer).map_err(|e| MetricsServerError::Encoding(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

#[derive(Debug)]
pub enum MetricsServerError {
    Encoding(String),
}

impl IntoResponse for MetricsServerError {
    fn into_response(self) -> Response {
        let MetricsServerError::Encoding(msg) = self;
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding error: {msg}"),
        )
            .into_response()
    }
}

impl std::fmt::Display for MetricsServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let MetricsServerError::Encoding(msg) = self;
        write!(f, "metrics encoding error: {msg}")
    }
}

impl std::error::Error for MetricsServerError {}
