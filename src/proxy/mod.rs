//! Proxy module for collecting and checking public proxies
//!
//! This module provides functionality for:
//! - Fetching proxy listings from remote sources with retry
//! - Parsing text and JSON listings into candidates
//! - Deduplicating proxies by endpoint
//! - Probing endpoints over TCP and validating them over HTTP

pub mod fetcher;
pub mod models;
pub mod parser;
pub mod pool;
pub mod quick_filter;
pub mod registry;
pub mod validator;

pub use fetcher::{
    default_sources, FetchedBody, FetcherConfig, ProxySource, RetryPolicy, SourceFetcher,
    SourceReport,
};
pub use models::{Anonymity, CheckOutcome, CheckStatus, ProxyCandidate, ProxyRecord, Scheme};
pub use parser::{ParseAttempt, RecordParser, SourceFormat};
pub use quick_filter::{QuickFilter, QuickFilterConfig};
pub use registry::ProxyRegistry;
pub use validator::{ProxyValidator, ValidatorConfig};
