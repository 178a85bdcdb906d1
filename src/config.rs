use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use axum::http::HeaderName;
use chrono::FixedOffset;

pub const DEFAULT_UPSTREAM: &str = "https://student-id-info-back-production.up.railway.app";
pub const DEFAULT_PROXY_PREFIXES: [&str; 2] = ["/api", "/student"];
pub const DEFAULT_FORWARD_HEADERS: [&str; 3] = ["authorization", "content-type", "accept"];

/// Requests under `prefix` go to `upstream` with their full path and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    pub prefix: String,
    pub upstream: String,
}

impl ProxyRule {
    pub fn new(prefix: &str, upstream: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            upstream: upstream.trim_end_matches('/').to_string(),
        }
    }

    /// Segment-aware: `/student` matches `/student/x` but not `/students`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl FromStr for ProxyRule {
    type Err = String;

    /// `/prefix=https://origin`
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (prefix, upstream) = value
            .split_once('=')
            .ok_or_else(|| format!("expected /prefix=origin, got {value:?}"))?;
        let rule = ProxyRule::new(prefix.trim(), upstream.trim());

        if !rule.prefix.starts_with('/') {
            return Err(format!("proxy prefix must start with '/' and not be the root: {prefix:?}"));
        }
        if !(rule.upstream.starts_with("http://") || rule.upstream.starts_with("https://")) {
            return Err(format!("proxy upstream must be an http(s) origin: {upstream:?}"));
        }
        Ok(rule)
    }
}

impl fmt::Display for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.prefix, self.upstream)
    }
}

pub fn default_rules(upstream: &str) -> Vec<ProxyRule> {
    DEFAULT_PROXY_PREFIXES
        .iter()
        .map(|prefix| ProxyRule::new(prefix, upstream))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub static_dir: PathBuf,
    pub rules: Vec<ProxyRule>,
    pub forward_headers: Vec<HeaderName>,
}

pub fn parse_header_name(value: &str) -> Result<HeaderName, String> {
    HeaderName::from_str(value.trim()).map_err(|e| format!("invalid header name {value:?}: {e}"))
}

/// `Z`, `+03:00`, `-0430` or `+3`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_string());
    }

    let invalid = || format!("invalid UTC offset {value:?}, expected e.g. +03:00");
    let (sign, digits) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
