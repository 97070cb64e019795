use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-lifetime counters shared by the ingestion gate and the consumer pool.
///
/// Counters are never reset and are not persisted: they only describe what this
/// process has seen since it started. Deduplication never reads them.
#[derive(Debug)]
pub struct Stats {
    received: AtomicU64,
    processed_success: AtomicU64,
    duplicates_dropped: AtomicU64,
    started_at: Instant,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub received: u64,
    pub processed_success: u64,
    pub duplicates_dropped: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            processed_success: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count `count` events as received. Called before they become visible to consumers,
    /// so `received` can never trail the consumer counters.
    pub fn record_received(&self, count: u64) {
        self.received.fetch_add(count, Ordering::SeqCst);
    }

    /// Undo `record_received` for events that never made it onto the queue.
    pub fn revert_received(&self, count: u64) {
        self.received.fetch_sub(count, Ordering::SeqCst);
    }

    pub fn record_processed(&self) {
        self.processed_success.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::SeqCst);
    }

    /// Read the consumer counters before `received`, so that a snapshot always
    /// satisfies `received >= processed_success + duplicates_dropped`.
    pub fn snapshot(&self) -> StatsSnapshot {
        let processed_success = self.processed_success.load(Ordering::SeqCst);
        let duplicates_dropped = self.duplicates_dropped.load(Ordering::SeqCst);
        let received = self.received.load(Ordering::SeqCst);

        StatsSnapshot {
            received,
            processed_success,
            duplicates_dropped,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a duration as `H:MM:SS`. Hours keep counting past a day.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
