//! YAML configuration loading and two-phase validation.
//!
//! Phase A (structural) is enforced mostly by serde: `deny_unknown_fields`
//! rejects unknown top-level and per-service keys, and missing required
//! fields fail to parse; those are true parse errors and short-circuit,
//! since there is no document left to validate further. Everything else
//! (string length/charset, numeric ranges, regex-shaped constraints) and all
//! of Phase B (cross-field: name uniqueness, `warning_threshold < timeout`,
//! payload-only-on-POST, scheme/protocol agreement) is collected into a
//! single ordered list of violations; validation never stops at the first
//! problem it finds.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use url::Url;

use super::model::{GlobalSettings, Method, RawConfig, ServiceDefinition, ValidatedConfig};

const MAX_NAME_LEN: usize = 100;
const MIN_CHECK_INTERVAL_SECS: u64 = 10;
const MIN_TIMEOUT_SECS: u64 = 1;
const MIN_PAGE_REFRESH_SECS: u64 = 5;
const MAX_RETRIES_CEILING: u32 = 10;
const MAX_WORKER_POOL_SIZE: u32 = 100;
const DEFAULT_PARALLELISM: usize = 4;
const MAX_PLATFORM_POOL_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("configuration validation failed with {} violation(s):\n{}", .0.len(), .0.join("\n"))]
    Violations(Vec<String>),
}

impl ConfigError {
    /// The ordered list of human-readable violations, empty for I/O or parse
    /// errors (those aren't a violation list; there was no document to
    /// check).
    pub fn violations(&self) -> &[String] {
        match self {
            ConfigError::Violations(v) => v,
            _ => &[],
        }
    }
}

/// Load and fully validate a configuration file from disk.
pub fn load_from_path(path: &Path) -> Result<ValidatedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&text, &path.display().to_string())
}

/// Parse and validate a configuration document already read into memory.
/// `label` is used only to annotate parse errors (typically the source path).
pub fn load_from_str(text: &str, label: &str) -> Result<ValidatedConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
        path: label.to_string(),
        source,
    })?;
    validate(raw)
}

/// CLI-oriented variant: loads and validates, printing every violation to
/// stderr (one per line, prefixed by service name where applicable) and
/// returning whether the configuration is usable. Read/parse failures print
/// a single line and also return `false`.
pub fn validate_cli(path: &Path) -> bool {
    match load_from_path(path) {
        Ok(_) => true,
        Err(ConfigError::Violations(violations)) => {
            eprintln!("configuration validation failed:");
            for violation in &violations {
                eprintln!("  - {violation}");
            }
            false
        }
        Err(other) => {
            eprintln!("{other}");
            false
        }
    }
}

fn validate(raw: RawConfig) -> Result<ValidatedConfig, ConfigError> {
    let mut violations = Vec::new();

    if raw.pings.is_empty() {
        violations.push("no services defined: `pings` must contain at least one entry".to_string());
        return Err(ConfigError::Violations(violations));
    }

    let settings = raw.settings.unwrap_or_default();
    validate_settings(&settings, &mut violations);

    let mut seen = HashSet::with_capacity(raw.pings.len());
    for service in &raw.pings {
        if !seen.insert(service.name.clone()) {
            violations.push(format!("service '{}': duplicate service name", service.name));
        }
        validate_service(service, &settings, &mut violations);
    }

    if violations.is_empty() {
        Ok(ValidatedConfig {
            settings,
            services: raw.pings,
        })
    } else {
        Err(ConfigError::Violations(violations))
    }
}

fn validate_settings(settings: &GlobalSettings, violations: &mut Vec<String>) {
    if settings.check_interval < MIN_CHECK_INTERVAL_SECS {
        violations.push(format!(
            "settings: check_interval must be >= {MIN_CHECK_INTERVAL_SECS}s, got {}",
            settings.check_interval
        ));
    }
    if settings.timeout < MIN_TIMEOUT_SECS {
        violations.push(format!(
            "settings: timeout must be >= {MIN_TIMEOUT_SECS}s, got {}",
            settings.timeout
        ));
    }
    if settings.page_refresh < MIN_PAGE_REFRESH_SECS {
        violations.push(format!(
            "settings: page_refresh must be >= {MIN_PAGE_REFRESH_SECS}s, got {}",
            settings.page_refresh
        ));
    }
    if settings.max_retries > MAX_RETRIES_CEILING {
        violations.push(format!(
            "settings: max_retries must be in 0..={MAX_RETRIES_CEILING}, got {}",
            settings.max_retries
        ));
    }
    if settings.worker_pool_size > MAX_WORKER_POOL_SIZE {
        violations.push(format!(
            "settings: worker_pool_size must be in 0..={MAX_WORKER_POOL_SIZE} (0 selects a platform default), got {}",
            settings.worker_pool_size
        ));
    }
    if settings.warning_threshold >= settings.timeout {
        violations.push(format!(
            "settings: warning_threshold ({}) must be less than timeout ({})",
            settings.warning_threshold, settings.timeout
        ));
    }
}

fn validate_service(
    service: &ServiceDefinition,
    settings: &GlobalSettings,
    violations: &mut Vec<String>,
) {
    let name = &service.name;

    if name.is_empty() {
        violations.push("service '': name must not be empty".to_string());
    } else if !name.is_ascii() {
        violations.push(format!("service '{name}': name must be ASCII"));
    } else if name.len() > MAX_NAME_LEN {
        violations.push(format!(
            "service '{name}': name must be <= {MAX_NAME_LEN} chars, got {}",
            name.len()
        ));
    }

    for tag in &service.tags {
        if !tag.is_ascii() {
            violations.push(format!("service '{name}': tag '{tag}' must be ASCII"));
        } else if tag.len() > MAX_NAME_LEN {
            violations.push(format!(
                "service '{name}': tag '{tag}' must be <= {MAX_NAME_LEN} chars"
            ));
        }
    }

    match Url::parse(&service.resource) {
        Ok(url) => {
            if url.host_str().is_none() {
                violations.push(format!(
                    "service '{name}': resource must be an absolute http(s) URL: {}",
                    service.resource
                ));
            } else if !service.protocol.matches_scheme(url.scheme()) {
                violations.push(format!(
                    "service '{name}': resource scheme '{}' does not match declared protocol",
                    url.scheme()
                ));
            }
        }
        Err(_) => {
            violations.push(format!(
                "service '{name}': resource must be an absolute http(s) URL: {}",
                service.resource
            ));
        }
    }

    if !(100..=599).contains(&service.expected.status) {
        violations.push(format!(
            "service '{name}': expected.status must be in range 100..=599, got {}",
            service.expected.status
        ));
    }

    if service.payload.is_some() && !matches!(service.method, Method::Post) {
        violations.push(format!(
            "service '{name}': payload is only valid when method is POST"
        ));
    }

    if let Some(interval) = service.interval {
        if interval < MIN_CHECK_INTERVAL_SECS {
            violations.push(format!(
                "service '{name}': interval must be >= {MIN_CHECK_INTERVAL_SECS}s, got {interval}"
            ));
        }
    }

    if let Some(timeout) = service.timeout {
        if timeout < MIN_TIMEOUT_SECS {
            violations.push(format!(
                "service '{name}': timeout must be >= {MIN_TIMEOUT_SECS}s, got {timeout}"
            ));
        }
    }

    let effective_timeout = service.timeout.unwrap_or(settings.timeout);
    let effective_warning = service.warning_threshold.unwrap_or(settings.warning_threshold);
    if effective_warning >= effective_timeout {
        violations.push(format!(
            "service '{name}': warning_threshold ({effective_warning}) must be less than timeout ({effective_timeout}) after applying defaults"
        ));
    }
}

/// Resolved worker pool size: explicit settings value, or a platform-derived
/// default (CPU count, capped at 16) when unset (0).
pub fn effective_pool_size(settings: &GlobalSettings) -> usize {
    if settings.worker_pool_size == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(DEFAULT_PARALLELISM)
            .min(MAX_PLATFORM_POOL_SIZE)
    } else {
        settings.worker_pool_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    expected:
      status: 200
"#
    }

    #[test]
    fn parses_minimal_document_with_defaults() {
        let cfg = load_from_str(minimal_yaml(), "test").unwrap();
        assert_eq!(cfg.services.len(), 1);
        assert_eq!(cfg.settings.check_interval, 60);
        assert_eq!(cfg.settings.max_retries, 2);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = format!("{}\nbogus: true\n", minimal_yaml());
        let err = load_from_str(&yaml, "test").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_unknown_service_key() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    unexpected_field: 1
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_empty_service_list() {
        let err = load_from_str("pings: []\n", "test").unwrap_err();
        assert!(err.violations().iter().any(|v| v.contains("pings")));
    }

    #[test]
    fn rejects_duplicate_names() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://a.example.com/health
    expected:
      status: 200
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://b.example.com/health
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err.violations().iter().any(|v| v.contains("duplicate")));
    }

    #[test]
    fn rejects_protocol_scheme_mismatch() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: http://api.example.com/health
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err.violations().iter().any(|v| v.contains("scheme")));
    }

    #[test]
    fn rejects_out_of_range_status() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    expected:
      status: 900
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err.violations().iter().any(|v| v.contains("expected.status")));
    }

    #[test]
    fn accepts_boundary_status_codes() {
        let yaml = r#"
pings:
  - name: a
    protocol: HTTPS
    method: GET
    resource: https://a.example.com/health
    expected:
      status: 100
  - name: b
    protocol: HTTPS
    method: GET
    resource: https://b.example.com/health
    expected:
      status: 599
"#;
        assert!(load_from_str(yaml, "test").is_ok());
    }

    #[test]
    fn rejects_payload_on_non_post_method() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    payload:
      key: value
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err.violations().iter().any(|v| v.contains("payload")));
    }

    #[test]
    fn accepts_payload_on_post_method() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: POST
    resource: https://api.example.com/health
    payload:
      key: value
    expected:
      status: 200
"#;
        assert!(load_from_str(yaml, "test").is_ok());
    }

    #[test]
    fn rejects_warning_threshold_not_less_than_timeout() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    warning_threshold: 5
    timeout: 5
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| v.contains("warning_threshold")));
    }

    #[test]
    fn rejects_check_interval_below_minimum() {
        let yaml = r#"
settings:
  check_interval: 9
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| v.contains("check_interval")));
    }

    #[test]
    fn accepts_check_interval_at_minimum() {
        let yaml = r#"
settings:
  check_interval: 10
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://api.example.com/health
    expected:
      status: 200
"#;
        assert!(load_from_str(yaml, "test").is_ok());
    }

    #[test]
    fn collects_multiple_violations_without_short_circuiting() {
        let yaml = r#"
pings:
  - name: api
    protocol: HTTPS
    method: GET
    resource: not-a-url
    expected:
      status: 900
  - name: api
    protocol: HTTPS
    method: GET
    resource: https://b.example.com/health
    expected:
      status: 200
"#;
        let err = load_from_str(yaml, "test").unwrap_err();
        let violations = err.violations();
        assert!(violations.len() >= 3, "expected multiple violations, got {violations:?}");
    }

    #[test]
    fn effective_pool_size_uses_platform_default_when_unset() {
        let settings = GlobalSettings::default();
        let size = effective_pool_size(&settings);
        assert!(size >= 1 && size <= 16);
    }

    #[test]
    fn effective_pool_size_honors_explicit_value() {
        let mut settings = GlobalSettings::default();
        settings.worker_pool_size = 3;
        assert_eq!(effective_pool_size(&settings), 3);
    }
}
