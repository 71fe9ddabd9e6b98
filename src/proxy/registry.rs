//! Endpoint-keyed proxy registry
//!
//! The registry does no locking of its own. The pipeline owns it and is the
//! only code path that mutates it; workers hand their results back instead.

use crate::proxy::models::{ProxyCandidate, ProxyRecord};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Deduplicating proxy collection with last-write-wins semantics
#[derive(Debug, Default, Clone)]
pub struct ProxyRegistry {
    records: HashMap<SocketAddr, ProxyRecord>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a candidate and store it, replacing any record at the same endpoint.
    ///
    /// Returns `false` when the address isn't an IP literal or the port is out
    /// of range; nothing is stored in that case.
    pub fn register(&mut self, candidate: ProxyCandidate) -> bool {
        match ProxyRecord::from_candidate(candidate) {
            Some(record) => {
                self.records.insert(record.endpoint, record);
                true
            }
            None => false,
        }
    }

    /// Write back a record, e.g. after validation
    pub fn store(&mut self, record: ProxyRecord) {
        self.records.insert(record.endpoint, record);
    }

    /// Replace the whole contents in one step
    pub fn replace<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ProxyRecord>,
    {
        self.records = records.into_iter().map(|r| (r.endpoint, r)).collect();
    }

    /// Owned copy of every record, in no particular order
    pub fn snapshot(&self) -> Vec<ProxyRecord> {
        self.records.values().cloned().collect()
    }

    /// Working records sorted by endpoint
    pub fn working(&self) -> Vec<ProxyRecord> {
        let mut working: Vec<ProxyRecord> = self
            .records
            .values()
            .filter(|r| r.is_working)
            .cloned()
            .collect();
        working.sort_by_key(|r| r.endpoint);
        working
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
