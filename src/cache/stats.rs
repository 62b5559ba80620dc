//! Cache statistics (spec §4.1.1 `stats()`, §4.1.9 prefetch counters).

use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub flushes: u64,
    pub flush_failures: u64,

    /// Scan-restart epochs (spec §4.1.3).
    pub slist_scan_restarts: u64,
    pub lru_scan_restarts: u64,
    pub index_scan_restarts: u64,

    /// MSIC bookkeeping (spec §4.1.3).
    pub msic_scanned: u64,
    pub msic_skipped: u64,
    pub oversize_events: u64,

    /// Prefetch counters (spec §4.1.9).
    pub images_created: u64,
    pub images_read: u64,
    pub images_loaded: u64,
    pub prefetches: u64,
    pub dirty_prefetches: u64,
    pub prefetch_hits: u64,

    /// SWMR read-retry counter (spec §4.1.8).
    pub read_attempts: u64,
    pub checksum_retries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn reset_hit_rate_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}
