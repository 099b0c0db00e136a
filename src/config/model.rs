//! Typed configuration model for the probe population.
//!
//! Mirrors the YAML schema described by the root `settings`/`pings` document.
//! Parsing only produces this model; cross-field validation lives in
//! `config::loader`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport scheme a service is probed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn matches_scheme(&self, scheme: &str) -> bool {
        match self {
            Protocol::Http => scheme.eq_ignore_ascii_case("http"),
            Protocol::Https => scheme.eq_ignore_ascii_case("https"),
        }
    }
}

/// HTTP method used for the probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

/// Validation block for a single service's expected response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expected {
    pub status: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// A single (name, value) request header pair. Kept as a vector rather than a
/// map to preserve declaration order in outbound requests.
pub type HeaderPair = (String, String);

/// Static contract for one probed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,
    pub protocol: Protocol,
    pub method: Method,
    pub resource: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub expected: Expected,
    #[serde(default)]
    pub headers: Vec<HeaderPair>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub warning_threshold: Option<u64>,
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Escapes the URL Guard for this service. Only ever honored in a debug
    /// build with `NODE_ENV=test` set; see `core::guard::bypass_active`.
    #[serde(default)]
    pub skip_validation: bool,
}

impl ServiceDefinition {
    /// Seconds between ticks for this service, after applying global defaults.
    pub fn effective_interval(&self, settings: &GlobalSettings) -> u64 {
        self.interval.unwrap_or(settings.check_interval)
    }

    /// Warning latency threshold in milliseconds.
    pub fn effective_warning_threshold_ms(&self, settings: &GlobalSettings) -> u64 {
        self.warning_threshold.unwrap_or(settings.warning_threshold) * 1000
    }

    /// Probe deadline in milliseconds.
    pub fn effective_timeout_ms(&self, settings: &GlobalSettings) -> u64 {
        self.timeout.unwrap_or(settings.timeout) * 1000
    }
}

/// Global defaults applied to every service unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_page_refresh")]
    pub page_refresh: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: u32,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_check_interval() -> u64 {
    60
}
fn default_warning_threshold() -> u64 {
    2
}
fn default_timeout() -> u64 {
    5
}
fn default_page_refresh() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_worker_pool_size() -> u32 {
    0
}
fn default_history_file() -> String {
    "history.csv".to_string()
}
fn default_output_dir() -> String {
    "public".to_string()
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            warning_threshold: default_warning_threshold(),
            timeout: default_timeout(),
            page_refresh: default_page_refresh(),
            max_retries: default_max_retries(),
            worker_pool_size: default_worker_pool_size(),
            history_file: default_history_file(),
            output_dir: default_output_dir(),
        }
    }
}

/// Root YAML document: `{settings?, pings: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub settings: Option<GlobalSettings>,
    pub pings: Vec<ServiceDefinition>,
}

/// Validated configuration consumed by the rest of the core.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub settings: GlobalSettings,
    pub services: Vec<ServiceDefinition>,
}
