//! Proxy data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Transport protocol a proxy speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Scheme {
    /// Map a source-reported protocol name onto a scheme.
    ///
    /// Returns `None` for names we don't know how to route through.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "socks4" | "socks4a" => Some(Scheme::Socks4),
            "socks5" | "socks5h" => Some(Scheme::Socks5),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, Scheme::Socks4 | Scheme::Socks5)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
            Scheme::Socks4 => write!(f, "socks4"),
            Scheme::Socks5 => write!(f, "socks5"),
        }
    }
}

/// How well a proxy hides the caller's address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    Transparent,
    Anonymous,
    High,
    #[default]
    Unknown,
}

impl Anonymity {
    /// Normalize the many spellings sources use for anonymity levels
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "transparent" | "noa" => Anonymity::Transparent,
            "anonymous" | "anm" | "anon" => Anonymity::Anonymous,
            "high" | "elite" | "hia" | "high anonymous" | "high_anonymous" | "high-anonymous" => {
                Anonymity::High
            }
            _ => Anonymity::Unknown,
        }
    }
}

impl fmt::Display for Anonymity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anonymity::Transparent => write!(f, "transparent"),
            Anonymity::Anonymous => write!(f, "anonymous"),
            Anonymity::High => write!(f, "high"),
            Anonymity::Unknown => write!(f, "unknown"),
        }
    }
}

/// A proxy entry as a source reported it, before any validation.
///
/// The host is kept as raw text and the port as a wide integer so that
/// out-of-range values survive until the registry rejects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u32,
    pub scheme: Scheme,
    pub country: Option<String>,
    pub anonymity: Option<Anonymity>,
}

impl ProxyCandidate {
    pub fn new(host: impl Into<String>, port: u32, scheme: Scheme) -> Self {
        Self {
            host: host.into(),
            port,
            scheme,
            country: None,
            anonymity: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_anonymity(mut self, anonymity: Anonymity) -> Self {
        self.anonymity = Some(anonymity);
        self
    }

    /// Resolve the candidate into a validated endpoint.
    ///
    /// Accepts bare or bracketed IPv6 literals. Returns `None` when the host
    /// isn't an IP literal or the port is outside `1..=65535`.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        let host = self.host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip: IpAddr = host.parse().ok()?;
        let port = u16::try_from(self.port).ok().filter(|p| *p != 0)?;
        Some(SocketAddr::new(ip, port))
    }
}

/// A registered proxy, unique by endpoint within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub endpoint: SocketAddr,
    pub scheme: Scheme,
    pub country: Option<String>,
    pub anonymity: Option<Anonymity>,
    pub latency_seconds: f64,
    pub last_checked: Option<DateTime<Utc>>,
    pub is_working: bool,
}

impl ProxyRecord {
    pub fn new(endpoint: SocketAddr, scheme: Scheme) -> Self {
        Self {
            endpoint,
            scheme,
            country: None,
            anonymity: None,
            latency_seconds: 0.0,
            last_checked: None,
            is_working: false,
        }
    }

    /// Build a fresh record from a candidate, or `None` if its endpoint is invalid
    pub fn from_candidate(candidate: ProxyCandidate) -> Option<Self> {
        let endpoint = candidate.endpoint()?;
        Some(Self {
            country: candidate
                .country
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            anonymity: candidate.anonymity,
            ..Self::new(endpoint, candidate.scheme)
        })
    }

    pub fn address(&self) -> IpAddr {
        self.endpoint.ip()
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// The proxy URL handed to the HTTP client
    pub fn url(&self) -> String {
        // HTTPS-listed proxies are plain HTTP proxies that support CONNECT.
        let scheme = match self.scheme {
            Scheme::Https => Scheme::Http,
            other => other,
        };
        format!("{}://{}", scheme, self.endpoint)
    }

    /// `IP:PORT`, with IPv6 addresses bracketed
    pub fn to_simple_string(&self) -> String {
        self.endpoint.to_string()
    }

    /// Record a successful validation
    pub fn mark_working(&mut self, latency_seconds: f64, checked_at: DateTime<Utc>) {
        self.is_working = true;
        self.latency_seconds = latency_seconds;
        self.last_checked = Some(checked_at);
    }

    /// Record a failed validation
    pub fn mark_failed(&mut self, checked_at: DateTime<Utc>) {
        self.is_working = false;
        self.latency_seconds = 0.0;
        self.last_checked = Some(checked_at);
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Result of validating a proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckStatus {
    Working,
    Failed(String),
    Timeout,
}

/// A validated record together with how its check went
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub record: ProxyRecord,
    pub status: CheckStatus,
}

impl CheckOutcome {
    pub fn is_working(&self) -> bool {
        matches!(self.status, CheckStatus::Working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_endpoint_ipv4() {
        let candidate = ProxyCandidate::new("127.0.0.1", 8080, Scheme::Http);
        assert_eq!(
            candidate.endpoint(),
            Some("127.0.0.1:8080".parse().unwrap())
        );
    }

    #[test]
    fn test_candidate_endpoint_ipv6() {
        let bare = ProxyCandidate::new("::1", 3128, Scheme::Http);
        let bracketed = ProxyCandidate::new("[::1]", 3128, Scheme::Http);
        assert_eq!(bare.endpoint(), Some("[::1]:3128".parse().unwrap()));
        assert_eq!(bare.endpoint(), bracketed.endpoint());
    }

    #[test]
    fn test_candidate_endpoint_rejects_bad_input() {
        assert!(ProxyCandidate::new("example.com", 80, Scheme::Http).endpoint().is_none());
        assert!(ProxyCandidate::new("999.1.1.1", 80, Scheme::Http).endpoint().is_none());
        assert!(ProxyCandidate::new("1.2.3.4", 0, Scheme::Http).endpoint().is_none());
        assert!(ProxyCandidate::new("1.2.3.4", 65536, Scheme::Http).endpoint().is_none());
    }

    #[test]
    fn test_record_from_candidate_keeps_metadata() {
        let candidate = ProxyCandidate::new("10.0.0.1", 1080, Scheme::Socks5)
            .with_country(" DE ")
            .with_anonymity(Anonymity::High);
        let record = ProxyRecord::from_candidate(candidate).unwrap();
        assert_eq!(record.scheme, Scheme::Socks5);
        assert_eq!(record.country.as_deref(), Some("DE"));
        assert_eq!(record.anonymity, Some(Anonymity::High));
        assert!(!record.is_working);
        assert_eq!(record.latency_seconds, 0.0);
        assert!(record.last_checked.is_none());
    }

    #[test]
    fn test_record_url() {
        let record = ProxyRecord::new("127.0.0.1:8080".parse().unwrap(), Scheme::Http);
        assert_eq!(record.url(), "http://127.0.0.1:8080");

        let record = ProxyRecord::new("192.168.1.1:1080".parse().unwrap(), Scheme::Socks5);
        assert_eq!(record.url(), "socks5://192.168.1.1:1080");

        let record = ProxyRecord::new("[2001:db8::1]:443".parse().unwrap(), Scheme::Https);
        assert_eq!(record.url(), "http://[2001:db8::1]:443");
    }

    #[test]
    fn test_mark_working_then_failed() {
        let mut record = ProxyRecord::new("127.0.0.1:8080".parse().unwrap(), Scheme::Http);
        let now = Utc::now();
        record.mark_working(0.42, now);
        assert!(record.is_working);
        assert_eq!(record.latency_seconds, 0.42);

        record.mark_failed(now);
        assert!(!record.is_working);
        assert_eq!(record.latency_seconds, 0.0);
        assert_eq!(record.last_checked, Some(now));
    }

    #[test]
    fn test_scheme_from_name() {
        assert_eq!(Scheme::from_name("HTTP"), Some(Scheme::Http));
        assert_eq!(Scheme::from_name("socks5"), Some(Scheme::Socks5));
        assert_eq!(Scheme::from_name("ftp"), None);
    }

    #[test]
    fn test_anonymity_labels() {
        assert_eq!(Anonymity::from_label("elite"), Anonymity::High);
        assert_eq!(Anonymity::from_label("High Anonymous"), Anonymity::High);
        assert_eq!(Anonymity::from_label("transparent"), Anonymity::Transparent);
        assert_eq!(Anonymity::from_label("anonymous"), Anonymity::Anonymous);
        assert_eq!(Anonymity::from_label("???"), Anonymity::Unknown);
    }
}
