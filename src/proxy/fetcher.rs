//! Source fetcher for downloading raw proxy listings
//!
//! This module provides:
//! - The built-in list of public proxy sources
//! - Retrieval of one source with a bounded timeout
//! - Automatic retry with exponential backoff on transient failures

use crate::error::FetchError;
use crate::proxy::models::Scheme;
use crate::proxy::parser::{ParseAttempt, RecordParser};
use crate::Result;
use rand::seq::IndexedRandom;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for source requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default number of retries after the first attempt
const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Browser user agents rotated across source requests
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15",
];

/// A remote listing of proxies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    /// Name used in logs and reports
    pub name: String,
    pub url: String,
    /// Scheme assumed for entries that don't state one
    pub scheme: Scheme,
}

impl ProxySource {
    pub fn new(name: &str, url: &str, scheme: Scheme) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            scheme,
        }
    }

    /// Host part of the source URL, falling back to the name
    pub fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.name.clone())
    }
}

/// The built-in list of public HTTP/HTTPS proxy sources
pub fn default_sources() -> Vec<ProxySource> {
    vec![
        ProxySource::new(
            "proxyscrape-v3",
            "https://api.proxyscrape.com/v3/free-proxy-list/get?request=displayproxies&protocol=http",
            Scheme::Http,
        ),
        ProxySource::new(
            "proxyscrape",
            "https://api.proxyscrape.com/?request=getproxies&proxytype=http",
            Scheme::Http,
        ),
        ProxySource::new(
            "proxyscan",
            "https://www.proxyscan.io/api/proxy?format=txt&type=http&limit=1000",
            Scheme::Http,
        ),
        ProxySource::new(
            "geonode",
            "https://proxylist.geonode.com/api/proxy-list?protocols=http,https&limit=500",
            Scheme::Http,
        ),
        ProxySource::new(
            "speedx",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "shiftytr-http",
            "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/http.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "shiftytr-https",
            "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/https.txt",
            Scheme::Https,
        ),
        ProxySource::new(
            "mertguvencli",
            "https://raw.githubusercontent.com/mertguvencli/http-proxy-list/main/proxy-list/data.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "monosans",
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "monosans-anonymous",
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies_anonymous/http.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "jetkai",
            "https://raw.githubusercontent.com/jetkai/proxy-list/main/online-proxies/txt/proxies-http.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "clarketm",
            "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
            Scheme::Http,
        ),
        ProxySource::new(
            "proxy-list-download-http",
            "https://www.proxy-list.download/api/v1/get?type=http",
            Scheme::Http,
        ),
        ProxySource::new(
            "proxy-list-download-https",
            "https://www.proxy-list.download/api/v1/get?type=https",
            Scheme::Https,
        ),
        ProxySource::new("proxyspace", "https://proxyspace.pro/http.txt", Scheme::Http),
        ProxySource::new(
            "openproxylist",
            "https://api.openproxylist.xyz/http.txt",
            Scheme::Http,
        ),
    ]
}

/// Exponential backoff schedule for transient fetch failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed): `base * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Configuration for the source fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for each individual request
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// User agents to rotate through; empty means the client default
    pub user_agents: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }
}

/// Raw body of a successful source fetch
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub body: String,
    pub content_type: Option<String>,
}

/// Outcome of fetching and parsing one source
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: ProxySource,
    pub result: std::result::Result<ParseAttempt, FetchError>,
}

impl SourceReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Number of candidates the source produced, zero on failure
    pub fn candidate_count(&self) -> usize {
        self.result
            .as_ref()
            .map(|attempt| attempt.candidates.len())
            .unwrap_or(0)
    }
}

/// Fetcher for raw source listings
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SourceFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Fetch a URL, retrying transient failures per the retry policy
    pub async fn fetch(&self, url: &str) -> std::result::Result<FetchedBody, FetchError> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    if attempt > 0 {
                        debug!(url, attempts = attempt + 1, "fetch succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(err) if err.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        url,
                        error = %err,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<FetchedBody, FetchError> {
        let mut request = self.client.get(url);
        if let Some(agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, agent);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(FetchedBody { body, content_type })
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.config
            .user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
    }

    /// Fetch a source and parse its body into candidates
    pub async fn fetch_source(&self, source: ProxySource) -> SourceReport {
        let result = self.fetch(&source.url).await.map(|fetched| {
            RecordParser::parse(&fetched.body, fetched.content_type.as_deref(), source.scheme)
        });
        SourceReport { source, result }
    }
}
