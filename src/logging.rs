//! Structured JSON-lines logging to stdout.
//!
//! A session id, a level gate read from the environment, and a redaction
//! pass applied before a line is ever written. This sink only ever writes
//! to stdout; the CSV history and JSON snapshot are this system's durable
//! record, so a rotated log file on top would just be a second, redundant
//! copy.
//!
//! Redaction here is an explicit key-path list rather than a regex
//! heuristic: the set of sensitive fields this system ever handles (request
//! headers, nothing else) is small and known up front, so an exact match is
//! both cheaper and impossible to under- or over-match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use serde_json::{json, Value};

const REDACTED: &str = "[REDACTED]";

/// Key paths (case-sensitive, dot-separated) redacted unconditionally from
/// every log line's `fields` object.
const REDACTED_KEY_PATHS: &[&str] = &[
    "password",
    "token",
    "apiKey",
    "api_key",
    "authorization",
    "secret",
    "accessToken",
    "headers.authorization",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    fn from_env_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

static DEBUG_WARNING_EMITTED: AtomicBool = AtomicBool::new(false);
static MIN_LEVEL: OnceLock<Level> = OnceLock::new();

fn min_level() -> Level {
    *MIN_LEVEL.get_or_init(|| {
        std::env::var("DEBUG")
            .ok()
            .and_then(|v| Level::from_env_str(&v))
            .unwrap_or(Level::Info)
    })
}

/// Structured logger. Cheap to clone: holds only a service name and env
/// label, both short-lived strings set once at startup.
#[derive(Clone)]
pub struct Logger {
    service: String,
    env: String,
}

impl Logger {
    pub fn new(service: impl Into<String>, env: impl Into<String>) -> Self {
        warn_on_debug_level_once();
        Self {
            service: service.into(),
            env: env.into(),
        }
    }

    pub fn log(
        &self,
        level: Level,
        module: &str,
        message: &str,
        correlation_id: Option<&str>,
        fields: Value,
    ) {
        if level < min_level() {
            return;
        }

        let mut line = json!({
            "level": level.as_str(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": self.service,
            "env": self.env,
            "module": module,
            "message": message,
            "fields": redact(fields),
        });

        if let Some(id) = correlation_id {
            line["correlationId"] = json!(id);
        }

        println!("{line}");
    }

    pub fn info(&self, module: &str, message: &str, correlation_id: Option<&str>, fields: Value) {
        self.log(Level::Info, module, message, correlation_id, fields);
    }

    pub fn warn(&self, module: &str, message: &str, correlation_id: Option<&str>, fields: Value) {
        self.log(Level::Warn, module, message, correlation_id, fields);
    }

    pub fn error(&self, module: &str, message: &str, correlation_id: Option<&str>, fields: Value) {
        self.log(Level::Error, module, message, correlation_id, fields);
    }

    pub fn debug(&self, module: &str, message: &str, correlation_id: Option<&str>, fields: Value) {
        self.log(Level::Debug, module, message, correlation_id, fields);
    }
}

fn warn_on_debug_level_once() {
    if min_level() != Level::Debug {
        return;
    }
    if DEBUG_WARNING_EMITTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        eprintln!("warning: DEBUG=debug is enabled; log fields may include request headers and other sensitive data that redaction did not anticipate");
    }
}

/// Redact every configured key path, recursing into `headers.*` so
/// `headers.authorization` is reachable as a nested key.
fn redact(fields: Value) -> Value {
    let mut fields = fields;
    if let Value::Object(map) = &mut fields {
        for path in REDACTED_KEY_PATHS {
            redact_path(map, path);
        }
    }
    fields
}

fn redact_path(map: &mut serde_json::Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            if map.contains_key(path) {
                map.insert(path.to_string(), json!(REDACTED));
            }
        }
        Some((head, rest)) => {
            if let Some(Value::Object(nested)) = map.get_mut(head) {
                redact_path(nested, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_top_level_sensitive_keys() {
        let fields = json!({"password": "hunter2", "user": "alice"});
        let redacted = redact(fields);
        assert_eq!(redacted["password"], json!(REDACTED));
        assert_eq!(redacted["user"], json!("alice"));
    }

    #[test]
    fn redacts_nested_headers_authorization() {
        let fields = json!({"headers": {"authorization": "Bearer xyz", "content-type": "json"}});
        let redacted = redact(fields);
        assert_eq!(redacted["headers"]["authorization"], json!(REDACTED));
        assert_eq!(redacted["headers"]["content-type"], json!("json"));
    }

    #[test]
    fn leaves_unrelated_keys_untouched() {
        let fields = json!({"latency_ms": 42, "status": "PASS"});
        let redacted = redact(fields.clone());
        assert_eq!(redacted, fields);
    }

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!(Level::from_env_str("WARN"), Some(Level::Warn));
        assert_eq!(Level::from_env_str("Fatal"), Some(Level::Fatal));
        assert_eq!(Level::from_env_str("bogus"), None);
    }
}
