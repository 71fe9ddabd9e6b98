//! Tracing subscriber setup for the binary

use crate::Result;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `proxy_harvest=debug,reqwest=warn`
    pub level: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn filter(&self) -> Result<EnvFilter> {
        Ok(EnvFilter::try_new(&self.level)?)
    }
}

/// Install the global stdout subscriber. Must be called once, first thing.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(config.ansi)
        .with_target(false);

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(stdout_layer)
        .try_init()?;

    Ok(())
}
