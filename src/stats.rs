//! Statistics tracking for the proxy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic counters for query outcomes.
pub struct Stats {
    started: Instant,
    requests: AtomicU64,
    synthesized: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    learned: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            synthesized: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            learned: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_synthesized(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.synthesized.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(response_time_ms);
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.add_response_time(response_time_ms);
    }

    pub fn record_dropped(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_learned(&self, records: usize) {
        self.learned.fetch_add(records as u64, Ordering::Relaxed);
    }

    fn add_response_time(&self, response_time_ms: f64) {
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let synthesized = self.synthesized.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let learned = self.learned.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let answered = synthesized + forwarded;
        let avg_response_ms = if answered > 0 {
            (total_us as f64 / answered as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            synthesized,
            forwarded,
            dropped,
            learned,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub synthesized: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub learned: u64,
    pub avg_response_ms: f64,
}
