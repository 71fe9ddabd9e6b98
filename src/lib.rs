//! Proxy Harvest - public proxy aggregator
//!
//! Fetches free proxy listings from a fixed set of sources, deduplicates them
//! by endpoint, validates them concurrently and writes the working set out as
//! TXT, JSON and CSV.

pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod proxy;

pub use error::FetchError;
pub use logging::LogConfig;
pub use output::{OutputConfig, OutputWriter};
pub use pipeline::{Pipeline, PipelineConfig, PipelineState, RunReport, SourceSummary};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    pub logging: LogConfig,
}
