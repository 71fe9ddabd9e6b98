//! TCP-connect liveness probe run ahead of full validation

use crate::proxy::models::ProxyRecord;
use crate::proxy::pool::fan_out;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Default connect timeout in milliseconds
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickFilterConfig {
    pub connect_timeout: Duration,
}

impl Default for QuickFilterConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl QuickFilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Drops endpoints that don't accept a TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickFilter {
    config: QuickFilterConfig,
}

impl QuickFilter {
    pub fn new(config: QuickFilterConfig) -> Self {
        Self { config }
    }

    /// Whether the endpoint accepts a connection within the timeout
    pub async fn probe(&self, endpoint: SocketAddr) -> bool {
        match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(endpoint)).await
        {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!(endpoint = %endpoint, error = %err, "connect failed");
                false
            }
            Err(_) => {
                debug!(endpoint = %endpoint, "connect timed out");
                false
            }
        }
    }

    /// Probe every record concurrently and return the reachable ones
    pub async fn retain_reachable(&self, records: Vec<ProxyRecord>, workers: usize) -> Vec<ProxyRecord> {
        let filter = *self;
        fan_out(records, workers, move |record| async move {
            let reachable = filter.probe(record.endpoint).await;
            reachable.then_some(record)
        })
        .await
        .into_iter()
        .flatten()
        .collect()
    }
}
