//! Error taxonomy shared by the probe engine, retry controller and metrics.

use std::fmt;

/// Classification bucket assigned to a failed probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    DnsFailure,
    ConnectionRefused,
    SslTls,
    Network,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DnsFailure => "DNS_FAILURE",
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::SslTls => "SSL_TLS",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Whether the Retry Controller should schedule another attempt for this
    /// kind of failure. TLS failures and unclassified errors are not
    /// retried: a bad certificate or an unrecognized failure mode is
    /// unlikely to resolve within the lifetime of a single tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::DnsFailure
                | ErrorKind::ConnectionRefused
                | ErrorKind::Network
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a transport-level failure message. Matching is case-insensitive
/// substring matching against the lowercased message, ordered from most to
/// least specific so a message mentioning both "timed out" and "connection"
/// still lands in the more informative bucket.
pub fn classify_transport_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        ErrorKind::Timeout
    } else if lower.contains("dns")
        || lower.contains("name resolution")
        || lower.contains("could not resolve host")
        || lower.contains("nodename nor servname")
    {
        ErrorKind::DnsFailure
    } else if lower.contains("connection refused") || lower.contains("econnrefused") {
        ErrorKind::ConnectionRefused
    } else if lower.contains("certificate")
        || lower.contains("ssl")
        || lower.contains("tls")
        || lower.contains("handshake")
    {
        ErrorKind::SslTls
    } else if lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("network")
        || lower.contains("unreachable")
    {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}

/// Classify an HTTP status code that did not satisfy the service's
/// expectation. Used only for metrics labelling; the probe outcome itself is
/// still derived from the full validation composition in `core::probe`.
pub fn classify_http_status(status: u16) -> &'static str {
    match status {
        200..=299 => "success",
        400..=499 => "client_error",
        500..=599 => "server_error",
        _ => "unexpected_status",
    }
}
