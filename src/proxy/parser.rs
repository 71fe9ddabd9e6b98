//! Record parser for normalizing source responses into proxy candidates
//!
//! Sources answer either with newline-delimited `IP:PORT` text or with JSON in
//! one of a handful of layouts. Parsing never fails as a whole: elements that
//! can't be understood are skipped and the rest of the body is still used.

use crate::proxy::models::{Anonymity, ProxyCandidate, Scheme};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::net::Ipv4Addr;

/// Whole-line `IPv4:PORT` matcher; octet and port ranges are checked after matching
static IP_PORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3}):(\d{1,5})$")
        .expect("Invalid IP:PORT regex")
});

/// Keys that may carry the proxy address, highest priority first
const ADDRESS_KEYS: &[&str] = &["ip", "ip_address", "ipAddress", "host", "address", "proxy_address"];

const PORT_KEY: &str = "port";

/// Keys under which keyed JSON documents keep their proxy list
const CONTAINER_KEYS: &[&str] = &["data", "proxies", "list", "results", "items"];

const SCHEME_KEYS: &[&str] = &["protocol", "type"];
const SCHEME_LIST_KEY: &str = "protocols";
const COUNTRY_KEYS: &[&str] = &["country", "country_code", "countryCode"];
const ANONYMITY_KEYS: &[&str] = &["anonymityLevel", "anonymity", "anonymity_level"];

/// Format a parse attempt was made in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Lines,
}

/// What one parse of a source body produced
#[derive(Debug, Clone)]
pub struct ParseAttempt {
    pub format: SourceFormat,
    pub candidates: Vec<ProxyCandidate>,
}

impl ParseAttempt {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Parser for raw source bodies
pub struct RecordParser;

impl RecordParser {
    /// Parse a source body.
    ///
    /// Structured parsing is tried first when the content type or the body
    /// itself looks like JSON. If it finds nothing, the body is read line by
    /// line instead.
    pub fn parse(body: &str, content_type: Option<&str>, default_scheme: Scheme) -> ParseAttempt {
        if Self::looks_structured(body, content_type) {
            let candidates = Self::parse_json(body, default_scheme);
            if !candidates.is_empty() {
                return ParseAttempt {
                    format: SourceFormat::Json,
                    candidates,
                };
            }
        }

        ParseAttempt {
            format: SourceFormat::Lines,
            candidates: Self::parse_lines(body, default_scheme),
        }
    }

    fn looks_structured(body: &str, content_type: Option<&str>) -> bool {
        let declared = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        let trimmed = body.trim_start();
        declared || trimmed.starts_with('[') || trimmed.starts_with('{')
    }

    /// Parse a JSON document into candidates; anything unparseable yields none
    pub fn parse_json(body: &str, default_scheme: Scheme) -> Vec<ProxyCandidate> {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        };

        let elements = match &value {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match Self::find_container(map) {
                Some(items) => items,
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        elements
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|element| Self::candidate_from_object(element, default_scheme))
            .collect()
    }

    fn find_container(map: &Map<String, Value>) -> Option<&[Value]> {
        CONTAINER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
    }

    fn candidate_from_object(
        element: &Map<String, Value>,
        default_scheme: Scheme,
    ) -> Option<ProxyCandidate> {
        let host = Self::first_str(element, ADDRESS_KEYS)?;
        let port = Self::port_value(element.get(PORT_KEY)?)?;

        let scheme = Self::scheme_value(element).unwrap_or(default_scheme);
        let mut candidate = ProxyCandidate::new(host.trim(), port, scheme);

        if let Some(country) = Self::first_str(element, COUNTRY_KEYS) {
            candidate = candidate.with_country(country);
        }
        if let Some(label) = Self::first_str(element, ANONYMITY_KEYS) {
            candidate = candidate.with_anonymity(Anonymity::from_label(label));
        }

        Some(candidate)
    }

    /// Ports come as numbers or numeric strings
    fn port_value(value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn scheme_value(element: &Map<String, Value>) -> Option<Scheme> {
        if let Some(name) = Self::first_str(element, SCHEME_KEYS) {
            if let Some(scheme) = Scheme::from_name(name) {
                return Some(scheme);
            }
        }
        element
            .get(SCHEME_LIST_KEY)
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(Value::as_str)
            .and_then(Scheme::from_name)
    }

    fn first_str<'a>(element: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|key| element.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
    }

    /// Parse newline-delimited `IP:PORT` text
    pub fn parse_lines(body: &str, default_scheme: Scheme) -> Vec<ProxyCandidate> {
        body.lines()
            .filter_map(|line| Self::parse_line(line, default_scheme))
            .collect()
    }

    /// Parse a single `IPv4:PORT` line. Partial matches are rejected.
    pub fn parse_line(line: &str, default_scheme: Scheme) -> Option<ProxyCandidate> {
        let caps = IP_PORT_LINE.captures(line.trim())?;

        let mut octets = [0u8; 4];
        for (i, octet) in octets.iter_mut().enumerate() {
            let value: u32 = caps[i + 1].parse().ok()?;
            *octet = u8::try_from(value).ok()?;
        }

        let port: u32 = caps[5].parse().ok()?;
        if port == 0 || port > u32::from(u16::MAX) {
            return None;
        }

        Some(ProxyCandidate::new(
            Ipv4Addr::from(octets).to_string(),
            port,
            default_scheme,
        ))
    }
}
