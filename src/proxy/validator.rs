//! Proxy validator: one HTTP round-trip through each proxy to an echo endpoint

use crate::proxy::models::{Anonymity, CheckOutcome, CheckStatus, ProxyRecord};
use crate::proxy::pool::fan_out;
use crate::Result;
use chrono::Utc;
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use serde_json::Value;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for a validation round-trip in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default echo endpoint; answers with the caller's observed address
const DEFAULT_ECHO_URL: &str = "http://httpbin.org/ip";

/// Field of the echo response holding the observed address
const DEFAULT_ECHO_IP_FIELD: &str = "origin";

/// Configuration for the proxy validator
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Budget for the whole round-trip, body included
    pub timeout: Duration,
    pub echo_url: String,
    pub echo_ip_field: String,
    /// Parse the echo body and classify anonymity
    pub check_anonymity: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            echo_url: DEFAULT_ECHO_URL.to_string(),
            echo_ip_field: DEFAULT_ECHO_IP_FIELD.to_string(),
            check_anonymity: true,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_echo_url(mut self, url: String) -> Self {
        self.echo_url = url;
        self
    }

    pub fn with_echo_ip_field(mut self, field: String) -> Self {
        self.echo_ip_field = field;
        self
    }

    pub fn with_anonymity_check(mut self, enabled: bool) -> Self {
        self.check_anonymity = enabled;
        self
    }
}

/// Validator for checking that proxies actually forward traffic
#[derive(Debug, Clone, Default)]
pub struct ProxyValidator {
    config: ValidatorConfig,
}

impl ProxyValidator {
    /// Create a new validator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new validator with custom configuration
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a single proxy, returning the updated record.
    ///
    /// `last_checked` is set whatever the outcome.
    pub async fn validate(&self, mut record: ProxyRecord) -> CheckOutcome {
        let start = Instant::now();

        let result = match self.create_client(&record) {
            Ok(client) => {
                match tokio::time::timeout(self.config.timeout, self.round_trip(&client)).await {
                    Ok(result) => result,
                    Err(_) => Err(CheckStatus::Timeout),
                }
            }
            Err(e) => Err(CheckStatus::Failed(e.to_string())),
        };
        let elapsed = start.elapsed();

        let status = match result.and_then(|body| self.classify(&record, &body)) {
            Ok(anonymity) => {
                record.mark_working(elapsed.as_secs_f64(), Utc::now());
                record.anonymity = Some(anonymity);
                CheckStatus::Working
            }
            Err(status) => {
                record.mark_failed(Utc::now());
                status
            }
        };

        debug!(
            endpoint = %record.endpoint,
            status = ?status,
            latency = record.latency_seconds,
            "validated proxy"
        );
        CheckOutcome { record, status }
    }

    /// Validate a batch concurrently with at most `workers` checks in flight
    pub async fn validate_all(&self, records: Vec<ProxyRecord>, workers: usize) -> Vec<CheckOutcome> {
        let validator = self.clone();
        fan_out(records, workers, move |record| {
            let validator = validator.clone();
            async move { validator.validate(record).await }
        })
        .await
    }

    async fn round_trip(&self, client: &Client) -> std::result::Result<String, CheckStatus> {
        let response = client
            .get(&self.config.echo_url)
            .send()
            .await
            .map_err(Self::request_failure)?;

        if response.status() != StatusCode::OK {
            return Err(CheckStatus::Failed(format!(
                "HTTP status: {}",
                response.status()
            )));
        }

        response.text().await.map_err(Self::request_failure)
    }

    fn request_failure(err: reqwest::Error) -> CheckStatus {
        if err.is_timeout() {
            CheckStatus::Timeout
        } else {
            CheckStatus::Failed(err.to_string())
        }
    }

    /// Decide the anonymity level from the echo body
    fn classify(
        &self,
        record: &ProxyRecord,
        body: &str,
    ) -> std::result::Result<Anonymity, CheckStatus> {
        if !self.config.check_anonymity {
            return Ok(record.anonymity.unwrap_or(Anonymity::Unknown));
        }

        let observed = self
            .observed_ip(body)
            .ok_or_else(|| CheckStatus::Failed("malformed echo response".to_string()))?;

        if observed == record.address() {
            Ok(Anonymity::Transparent)
        } else {
            Ok(Anonymity::High)
        }
    }

    /// First address in the echo field; some echo services append forwarding hops
    fn observed_ip(&self, body: &str) -> Option<IpAddr> {
        let value: Value = serde_json::from_str(body).ok()?;
        let field = value.get(&self.config.echo_ip_field)?.as_str()?;
        field.split(',').next()?.trim().parse().ok()
    }

    /// Create a reqwest client routed through the proxy
    fn create_client(&self, record: &ProxyRecord) -> Result<Client> {
        let proxy = ReqwestProxy::all(record.url())?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::Scheme;

    fn record(addr: &str) -> ProxyRecord {
        ProxyRecord::new(addr.parse().unwrap(), Scheme::Http)
    }

    #[test]
    fn test_validator_config_default() {
        let config = ValidatorConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.echo_url, DEFAULT_ECHO_URL);
        assert_eq!(config.echo_ip_field, DEFAULT_ECHO_IP_FIELD);
        assert!(config.check_anonymity);
    }

    #[test]
    fn test_validator_config_builder() {
        let config = ValidatorConfig::new()
            .with_timeout(Duration::from_secs(2))
            .with_echo_url("http://example.com/ip".to_string())
            .with_echo_ip_field("ip".to_string())
            .with_anonymity_check(false);

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.echo_url, "http://example.com/ip");
        assert_eq!(config.echo_ip_field, "ip");
        assert!(!config.check_anonymity);
    }

    #[test]
    fn test_create_client_for_every_scheme() {
        let validator = ProxyValidator::new();
        for scheme in [Scheme::Http, Scheme::Https, Scheme::Socks4, Scheme::Socks5] {
            let proxy = ProxyRecord::new("127.0.0.1:1080".parse().unwrap(), scheme);
            assert!(
                validator.create_client(&proxy).is_ok(),
                "no client for {}",
                proxy.url()
            );
        }
    }

    #[test]
    fn test_classify_high_and_transparent() {
        let validator = ProxyValidator::new();
        let proxy = record("1.2.3.4:8080");

        let high = validator.classify(&proxy, r#"{"origin": "9.9.9.9"}"#);
        assert_eq!(high, Ok(Anonymity::High));

        let transparent = validator.classify(&proxy, r#"{"origin": "1.2.3.4, 10.0.0.1"}"#);
        assert_eq!(transparent, Ok(Anonymity::Transparent));
    }

    #[test]
    fn test_classify_malformed_body() {
        let validator = ProxyValidator::new();
        let proxy = record("1.2.3.4:8080");
        assert!(matches!(
            validator.classify(&proxy, "<html>captive portal</html>"),
            Err(CheckStatus::Failed(_))
        ));
        assert!(matches!(
            validator.classify(&proxy, r#"{"ip": "9.9.9.9"}"#),
            Err(CheckStatus::Failed(_))
        ));
    }

    #[test]
    fn test_classify_skipped_keeps_source_value() {
        let validator =
            ProxyValidator::with_config(ValidatorConfig::new().with_anonymity_check(false));

        let mut proxy = record("1.2.3.4:8080");
        assert_eq!(validator.classify(&proxy, "not json"), Ok(Anonymity::Unknown));

        proxy.anonymity = Some(Anonymity::Anonymous);
        assert_eq!(validator.classify(&proxy, "not json"), Ok(Anonymity::Anonymous));
    }
}
