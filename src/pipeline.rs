//! Fetch → quick-filter → validate orchestration
//!
//! The pipeline owns the registry and is the only place that writes to it.
//! Every stage fans work out through the same bounded pool and waits for the
//! whole batch before the next stage starts.

use crate::proxy::{
    default_sources, FetcherConfig, ProxyRecord, ProxyRegistry, ProxySource, ProxyValidator,
    QuickFilter, QuickFilterConfig, SourceFetcher, SourceFormat, SourceReport, ValidatorConfig,
};
use crate::proxy::pool::fan_out;
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, warn};

/// Default number of concurrent workers per stage
const DEFAULT_WORKERS: usize = 100;

/// Default number of proxies validated per batch
const DEFAULT_BATCH_SIZE: usize = 500;

/// Stages a run moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    QuickFiltering,
    Validating,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Fetching => "fetching",
            PipelineState::QuickFiltering => "quick-filtering",
            PipelineState::Validating => "validating",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sources: Vec<ProxySource>,
    /// Concurrent workers, shared by every fan-out stage
    pub workers: usize,
    pub batch_size: usize,
    pub quick_filter: bool,
    pub fetcher: FetcherConfig,
    pub quick_filter_config: QuickFilterConfig,
    pub validator: ValidatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            quick_filter: true,
            fetcher: FetcherConfig::default(),
            quick_filter_config: QuickFilterConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(mut self, sources: Vec<ProxySource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_quick_filter(mut self, enabled: bool) -> Self {
        self.quick_filter = enabled;
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_quick_filter_config(mut self, config: QuickFilterConfig) -> Self {
        self.quick_filter_config = config;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }
}

/// Per-source result of the fetch stage
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub name: String,
    pub url: String,
    pub format: Option<SourceFormat>,
    pub candidates: usize,
    pub accepted: usize,
    pub error: Option<String>,
}

/// Everything a finished run hands to the output stage
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every record that went through validation
    pub records: Vec<ProxyRecord>,
    pub sources: Vec<SourceSummary>,
    /// States visited, in order
    pub states: Vec<PipelineState>,
    /// Records registered before quick filtering
    pub registered: usize,
    pub anonymity_checked: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Working records sorted by endpoint
    pub fn working(&self) -> Vec<&ProxyRecord> {
        let mut working: Vec<&ProxyRecord> = self.records.iter().filter(|r| r.is_working).collect();
        working.sort_by_key(|r| r.endpoint);
        working
    }

    pub fn quick_filtered(&self) -> bool {
        self.states.contains(&PipelineState::QuickFiltering)
    }

    /// Records sorted by endpoint
    pub fn sorted_records(&self) -> Vec<&ProxyRecord> {
        let mut records: Vec<&ProxyRecord> = self.records.iter().collect();
        records.sort_by_key(|r| r.endpoint);
        records
    }
}

/// Batch job that fetches, filters and validates proxies
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: SourceFetcher,
    quick_filter: QuickFilter,
    validator: ProxyValidator,
    registry: ProxyRegistry,
    state: PipelineState,
    visited: Vec<PipelineState>,
}

impl Pipeline {
    /// Build a pipeline; fails only if the HTTP client can't be set up
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let fetcher = SourceFetcher::with_config(config.fetcher.clone())?;
        let quick_filter = QuickFilter::new(config.quick_filter_config);
        let validator = ProxyValidator::with_config(config.validator.clone());

        Ok(Self {
            config,
            fetcher,
            quick_filter,
            validator,
            registry: ProxyRegistry::new(),
            state: PipelineState::Idle,
            visited: vec![PipelineState::Idle],
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    fn transition(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "pipeline stage");
        self.state = next;
        self.visited.push(next);
    }

    /// Run the whole job from an empty registry.
    ///
    /// Source and proxy failures only shrink the result; this never fails.
    pub async fn run(&mut self) -> RunReport {
        let started_at = Utc::now();
        self.registry.clear();
        self.state = PipelineState::Idle;
        self.visited = vec![PipelineState::Idle];

        self.transition(PipelineState::Fetching);
        let sources = self.fetch_stage().await;
        let registered = self.registry.len();

        if self.config.quick_filter {
            self.transition(PipelineState::QuickFiltering);
            self.quick_filter_stage().await;
        }

        self.transition(PipelineState::Validating);
        self.validate_stage().await;

        self.transition(PipelineState::Done);
        let report = RunReport {
            records: self.registry.snapshot(),
            sources,
            states: self.visited.clone(),
            registered,
            anonymity_checked: self.config.validator.check_anonymity,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            registered,
            checked = report.records.len(),
            working = report.working().len(),
            "run complete"
        );
        report
    }

    async fn fetch_stage(&mut self) -> Vec<SourceSummary> {
        let fetcher = self.fetcher.clone();
        let reports = fan_out(self.config.sources.clone(), self.config.workers, move |source| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_source(source).await }
        })
        .await;

        let summaries: Vec<SourceSummary> = reports
            .into_iter()
            .map(|report| self.register_report(report))
            .collect();

        let failed = summaries.iter().filter(|s| s.error.is_some()).count();
        info!(
            sources = summaries.len(),
            failed,
            unique = self.registry.len(),
            "fetch stage finished"
        );
        summaries
    }

    fn register_report(&mut self, report: SourceReport) -> SourceSummary {
        let SourceReport { source, result } = report;
        match result {
            Ok(attempt) => {
                let candidates = attempt.candidates.len();
                let accepted = attempt
                    .candidates
                    .into_iter()
                    .map(|candidate| self.registry.register(candidate))
                    .filter(|accepted| *accepted)
                    .count();
                info!(
                    source = %source.name,
                    format = ?attempt.format,
                    candidates,
                    accepted,
                    "source fetched"
                );
                SourceSummary {
                    name: source.name,
                    url: source.url,
                    format: Some(attempt.format),
                    candidates,
                    accepted,
                    error: None,
                }
            }
            Err(err) => {
                warn!(source = %source.name, url = %source.url, error = %err, "source failed");
                SourceSummary {
                    name: source.name,
                    url: source.url,
                    format: None,
                    candidates: 0,
                    accepted: 0,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn quick_filter_stage(&mut self) {
        let before = self.registry.len();
        let survivors = self
            .quick_filter
            .retain_reachable(self.registry.snapshot(), self.config.workers)
            .await;
        self.registry.replace(survivors);
        info!(before, reachable = self.registry.len(), "quick filter finished");
    }

    async fn validate_stage(&mut self) {
        let records = self.registry.snapshot();
        let total = records.len();
        let batch_size = self.config.batch_size.max(1);
        let mut working = 0;

        for (index, batch) in records.chunks(batch_size).enumerate() {
            let outcomes = self
                .validator
                .validate_all(batch.to_vec(), self.config.workers)
                .await;
            for outcome in outcomes {
                if outcome.is_working() {
                    working += 1;
                }
                self.registry.store(outcome.record);
            }
            info!(
                batch = index + 1,
                done = ((index + 1) * batch_size).min(total),
                total,
                "validation batch finished"
            );
        }

        info!(total, working, "validation finished");
    }
}
