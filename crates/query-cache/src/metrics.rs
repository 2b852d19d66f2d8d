//! Store metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal counters for store and fetch activity.
#[derive(Debug, Default)]
pub(crate) struct StoreMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    fetches: AtomicU64,
    joined_fetches: AtomicU64,
}

impl StoreMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_joined_fetch(&self) {
        self.joined_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub(crate) fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub(crate) fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub(crate) fn joined_fetches(&self) -> u64 {
        self.joined_fetches.load(Ordering::Relaxed)
    }

    pub(crate) fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.fetches.store(0, Ordering::Relaxed);
        self.joined_fetches.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_with_no_accesses_is_zero() {
        let metrics = StoreMetrics::new();
        assert_eq!(metrics.hit_ratio(), 0.0);
    }

    #[test]
    fn hit_ratio_counts_hits_and_misses() {
        let metrics = StoreMetrics::new();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.hit_ratio(), 0.5);
    }

    #[test]
    fn reset_zeroes_all_counters() {
        let metrics = StoreMetrics::new();
        metrics.record_hit();
        metrics.record_fetch();
        metrics.record_joined_fetch();
        metrics.record_invalidations(3);
        metrics.reset();

        assert_eq!(metrics.hits(), 0);
        assert_eq!(metrics.fetches(), 0);
        assert_eq!(metrics.joined_fetches(), 0);
        assert_eq!(metrics.invalidations(), 0);
    }
}
