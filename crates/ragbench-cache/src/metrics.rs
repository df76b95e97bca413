//! Cache hit/miss accounting

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime},
};

use serde::{Deserialize, Serialize};

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub removals: u64,
    /// Hits served by the secondary level and promoted to the primary one
    pub promotions: u64,
    pub avg_retrieval_time_ms: f64,
    pub avg_store_time_ms: f64,
    pub created_at: SystemTime,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    pub fn miss_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            100.0 - self.hit_rate()
        }
    }

    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Thread-safe cache metrics tracker
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    stores: Arc<AtomicU64>,
    removals: Arc<AtomicU64>,
    promotions: Arc<AtomicU64>,
    total_retrieval_time_us: Arc<AtomicU64>,
    total_store_time_us: Arc<AtomicU64>,
    created_at: SystemTime,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            stores: Arc::new(AtomicU64::new(0)),
            removals: Arc::new(AtomicU64::new(0)),
            promotions: Arc::new(AtomicU64::new(0)),
            total_retrieval_time_us: Arc::new(AtomicU64::new(0)),
            total_store_time_us: Arc::new(AtomicU64::new(0)),
            created_at: SystemTime::now(),
        }
    }

    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_retrieval_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_retrieval_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_store(&self, elapsed: Duration) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.total_store_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let stores = self.stores.load(Ordering::Relaxed);
        let retrieval_us = self.total_retrieval_time_us.load(Ordering::Relaxed);
        let store_us = self.total_store_time_us.load(Ordering::Relaxed);

        let lookups = hits + misses;
        let avg_retrieval_time_ms = if lookups > 0 {
            retrieval_us as f64 / lookups as f64 / 1000.0
        } else {
            0.0
        };
        let avg_store_time_ms = if stores > 0 {
            store_us as f64 / stores as f64 / 1000.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            stores,
            removals: self.removals.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            avg_retrieval_time_ms,
            avg_store_time_ms,
            created_at: self.created_at,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stores.store(0, Ordering::Relaxed);
        self.removals.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.total_retrieval_time_us.store(0, Ordering::Relaxed);
        self.total_store_time_us.store(0, Ordering::Relaxed);
    }

    /// One-line summary suitable for a log field
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "hits={} misses={} stores={} hit_rate={:.2}% promotions={}",
            stats.hits,
            stats.misses,
            stats.stores,
            stats.hit_rate(),
            stats.promotions
        )
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation timing helper
#[derive(Debug)]
pub struct OperationTimer {
    start_time: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
