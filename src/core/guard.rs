//! URL Guard: synchronous, side-effect-free SSRF policy checks.
//!
//! Every check here is purely syntactic (scheme, hostname literal, hostname
//! suffix, or IP octet comparison) and never performs I/O.
//! No DNS resolution happens in this module; a hostname that only resolves
//! to a private address at request time is out of scope for the Guard and is
//! instead surfaced as a transport-level failure by the probe engine.

use std::net::IpAddr;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("scheme {0} is not permitted, only http and https are allowed")]
    SchemeNotAllowed(String),
    #[error("url has no host")]
    MissingHost,
    #[error("host {0} resolves to a disallowed local or private target")]
    LocalOrPrivateHost(String),
    #[error("Link-local address blocked: {0}")]
    LinkLocalHost(String),
    #[error("host {0} matches a blocked cloud metadata endpoint")]
    MetadataHost(String),
    #[error("host {0} has a blocked internal suffix")]
    BlockedSuffix(String),
}

const METADATA_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "metadata",
    "100.100.100.200",
    "kubernetes.default.svc",
    "consul",
];

const BLOCKED_SUFFIXES: &[&str] = &[".internal", ".local"];

/// Validate a URL against the SSRF policy: scheme allowlist, localhost,
/// RFC1918/link-local ranges, IPv6 unique-local/link-local ranges, known
/// cloud metadata hosts, and blocked hostname suffixes.
pub fn validate_url(raw: &str) -> Result<Url, GuardError> {
    let url = Url::parse(raw).map_err(|e| GuardError::InvalidUrl(e.to_string()))?;
    check_scheme(&url)?;
    let host = url.host_str().ok_or(GuardError::MissingHost)?;
    check_metadata_host(host)?;
    check_blocked_suffix(host)?;
    check_local_or_private(host)?;
    Ok(url)
}

/// Whether the test-mode bypass of this guard is unlockable in this build.
/// Gated on `debug_assertions` so a release binary never compiles in the
/// possibility, matching "MUST NOT be available to production builds";
/// `NODE_ENV=test` is the runtime half of the switch.
fn bypass_buildable() -> bool {
    cfg!(debug_assertions)
}

/// True when the probe engine should skip this guard entirely for a service
/// whose `skip_validation` flag is set. Only ever true in a debug build with
/// `NODE_ENV=test` in the environment; both conditions are required.
pub fn bypass_active(skip_validation: bool) -> bool {
    skip_validation
        && bypass_buildable()
        && std::env::var("NODE_ENV")
            .map(|v| v.eq_ignore_ascii_case("test"))
            .unwrap_or(false)
}

/// Parse a resource URL honoring the per-service `skip_validation` escape
/// hatch: when the bypass is active, only a syntactic URL parse happens, no
/// policy check. Otherwise identical to `validate_url`.
pub fn validate_url_for_service(raw: &str, skip_validation: bool) -> Result<Url, GuardError> {
    if bypass_active(skip_validation) {
        return Url::parse(raw).map_err(|e| GuardError::InvalidUrl(e.to_string()));
    }
    validate_url(raw)
}

/// Validate that a redirect target does not escape the original host. Used
/// by the probe engine when a response carries a redirect the configuration
/// opted to observe (redirects are never auto-followed, see `core::probe`).
pub fn validate_same_host(original: &Url, candidate: &Url) -> Result<(), GuardError> {
    let original_host = original.host_str().ok_or(GuardError::MissingHost)?;
    let candidate_host = candidate.host_str().ok_or(GuardError::MissingHost)?;
    if !original_host.eq_ignore_ascii_case(candidate_host) {
        return Err(GuardError::LocalOrPrivateHost(candidate_host.to_string()));
    }
    Ok(())
}

fn check_scheme(url: &Url) -> Result<(), GuardError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GuardError::SchemeNotAllowed(other.to_string())),
    }
}

fn check_metadata_host(host: &str) -> Result<(), GuardError> {
    if METADATA_HOSTS.iter().any(|h| host.eq_ignore_ascii_case(h)) {
        return Err(GuardError::MetadataHost(host.to_string()));
    }
    Ok(())
}

fn check_blocked_suffix(host: &str) -> Result<(), GuardError> {
    let lower = host.to_lowercase();
    if BLOCKED_SUFFIXES.iter().any(|suf| lower.ends_with(suf)) {
        return Err(GuardError::BlockedSuffix(host.to_string()));
    }
    Ok(())
}

fn check_local_or_private(host: &str) -> Result<(), GuardError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err(GuardError::LocalOrPrivateHost(host.to_string()));
    }

    // First-octet literal prefixes, matched even when the rest of the
    // address does not fully parse as an IpAddr (e.g. host headers that
    // carry a bare leading octet).
    if host.starts_with("127.") || host.starts_with("0.") || host == "0.0.0.0" {
        return Err(GuardError::LocalOrPrivateHost(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_link_local_ip(&ip) {
            return Err(GuardError::LinkLocalHost(host.to_string()));
        }
        if is_disallowed_ip(&ip) {
            return Err(GuardError::LocalOrPrivateHost(host.to_string()));
        }
    }

    Ok(())
}

/// `169.254.0.0/16` and `fe80::/10`, called out separately from the other
/// private ranges so the failure reason names "Link-local" specifically.
fn is_link_local_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => is_link_local_v6(v6),
    }
}

fn is_disallowed_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_unspecified() || v4.is_broadcast() || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || is_unique_local_v6(v6),
    }
}

/// `fc00::/7`, IPv6 unique local addresses. Stable in std only behind a
/// nightly feature, so checked directly against the first byte.
fn is_unique_local_v6(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

/// `fe80::/10`, IPv6 link local addresses.
fn is_link_local_v6(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_ordinary_https_host() {
        assert!(validate_url("https://api.example.com/health").is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = validate_url("ftp://example.com/file").unwrap_err();
        assert!(matches!(err, GuardError::SchemeNotAllowed(_)));
    }

    #[test]
    fn rejects_localhost() {
        let err = validate_url("http://localhost:8080/").unwrap_err();
        assert!(matches!(err, GuardError::LocalOrPrivateHost(_)));
    }

    #[test]
    fn rejects_loopback_ip() {
        let err = validate_url("http://127.0.0.1/").unwrap_err();
        assert!(matches!(err, GuardError::LocalOrPrivateHost(_)));
    }

    #[test]
    fn rejects_rfc1918_private_ip() {
        assert!(validate_url("http://10.0.0.5/").is_err());
        assert!(validate_url("http://172.16.0.5/").is_err());
        assert!(validate_url("http://192.168.1.5/").is_err());
    }

    #[test]
    fn rejects_link_local_ip() {
        let err = validate_url("http://169.254.1.1/").unwrap_err();
        assert!(matches!(err, GuardError::LinkLocalHost(_)));
        assert!(err.to_string().contains("Link-local"));
    }

    #[test]
    fn rejects_link_local_metadata_ip() {
        let err = validate_url("http://169.254.169.254/latest/meta-data/").unwrap_err();
        assert!(matches!(err, GuardError::LinkLocalHost(_)));
        assert!(err.to_string().contains("Link-local"));
    }

    #[test]
    fn rejects_named_metadata_hosts() {
        let err = validate_url("http://metadata.google.internal/computeMetadata/").unwrap_err();
        assert!(matches!(err, GuardError::MetadataHost(_)) || matches!(err, GuardError::BlockedSuffix(_)));
        let err = validate_url("http://consul/v1/catalog").unwrap_err();
        assert!(matches!(err, GuardError::MetadataHost(_)));
    }

    #[test]
    fn rejects_internal_and_local_suffixes() {
        assert!(matches!(
            validate_url("https://db.internal/status").unwrap_err(),
            GuardError::BlockedSuffix(_)
        ));
        assert!(matches!(
            validate_url("https://printer.local/status").unwrap_err(),
            GuardError::BlockedSuffix(_)
        ));
    }

    #[test]
    fn rejects_ipv6_loopback_and_unique_local() {
        assert!(validate_url("http://[::1]/").is_err());
        assert!(validate_url("http://[fd00::1]/").is_err());
        assert!(validate_url("http://[fe80::1]/").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn bypass_requires_both_flag_and_env_in_debug_build() {
        assert!(!bypass_active(false));
        std::env::remove_var("NODE_ENV");
        assert!(!bypass_active(true));
        std::env::set_var("NODE_ENV", "test");
        assert!(bypass_active(true));
        std::env::remove_var("NODE_ENV");
    }

    #[test]
    fn same_host_redirect_passes() {
        let original = Url::parse("https://api.example.com/a").unwrap();
        let candidate = Url::parse("https://api.example.com/b").unwrap();
        assert!(validate_same_host(&original, &candidate).is_ok());
    }

    #[test]
    fn cross_host_redirect_rejected() {
        let original = Url::parse("https://api.example.com/a").unwrap();
        let candidate = Url::parse("https://evil.example.net/b").unwrap();
        assert!(validate_same_host(&original, &candidate).is_err());
    }
}
