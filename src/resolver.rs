//! DNS query resolution logic.
//!
//! Handles the core query processing pipeline:
//! 1. Parse the question section (malformed queries are rejected)
//! 2. Answer A questions straight from the record cache
//! 3. Otherwise forward, and learn records from the upstream reply
//!
//! Transports handle the actual I/O, resolver handles decisions.

use std::sync::Arc;

use crate::cache::RecordCache;
use crate::dns::{self, RecordData, RecordType};
use crate::error::Result;
use crate::stats::{Stats, StatsSnapshot};

/// Action to take for a DNS query.
#[derive(Debug)]
pub enum QueryAction {
    /// Answered from cache, send this response immediately.
    Synthesized { response: Vec<u8>, domain: String },
    /// Query should be forwarded to upstream.
    Forward { domain: String },
    /// No question of a supported type; the query is dropped without reply.
    Ignore { domain: String },
}

/// Resolver handles DNS query processing decisions.
///
/// Shared by every in-flight query. The cache is the only mutable state and
/// synchronizes itself.
pub struct Resolver {
    cache: Arc<RecordCache>,
    stats: Stats,
}

impl Resolver {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self {
            cache,
            stats: Stats::new(),
        }
    }

    /// Process a DNS query and decide what action to take.
    ///
    /// Only the first question drives the cache decision: it is answered
    /// locally when it is an A question with a live cache entry. Anything
    /// else is forwarded whole.
    pub fn process_query(&self, query: &[u8]) -> Result<QueryAction> {
        let questions = dns::parse_questions(query)?;
        let domain = questions
            .first()
            .map(|q| q.name.clone())
            .unwrap_or_else(|| "<none>".to_string());

        if !questions.iter().any(|q| q.record_type().is_some()) {
            return Ok(QueryAction::Ignore { domain });
        }

        if let Some(first) = questions.first().filter(|q| q.record_type() == Some(RecordType::A)) {
            if let Some(RecordData::A(addr)) = self.cache.get(&first.name, RecordType::A) {
                let response = dns::synthesize_answer(query, addr)?;
                return Ok(QueryAction::Synthesized { response, domain });
            }
        }

        Ok(QueryAction::Forward { domain })
    }

    /// Called with every upstream reply; caches the supported records it
    /// carries. Returns how many records were learned.
    pub fn process_response(&self, response: &[u8]) -> Result<usize> {
        let records = dns::parse_records(response)?;
        let learned = records.len();

        for record in records {
            self.cache.set(&record.name, record.data, record.ttl);
        }
        self.stats.record_learned(learned);

        Ok(learned)
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}
