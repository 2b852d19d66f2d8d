//! Shared query store
//!
//! The store is a single shared mutable structure behind an async lock:
//! every insert, stale-mark, and eviction is atomic with respect to a key,
//! so overlapping reads and writes never lose updates. It is an injected
//! instance with an explicit lifecycle (construct at application start,
//! [`clear`](QueryStore::clear) at teardown), not a process-wide singleton,
//! so tests construct isolated stores freely.
//!
//! Invalidation marks entries stale instead of removing them: a stale
//! entry's value stays readable as the last known good until a re-fetch
//! replaces it.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::entry::{CacheEntry, Freshness};
use crate::key::QueryKey;
use crate::metrics::StoreMetrics;

/// Bounded, thread-safe store mapping [`QueryKey`]s to cached values.
#[derive(Clone)]
pub struct QueryStore {
    config: StoreConfig,
    entries: Arc<RwLock<LruCache<QueryKey, CacheEntry>>>,
    metrics: Arc<StoreMetrics>,
}

impl QueryStore {
    /// Create a store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1)).unwrap();
        Self {
            config,
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Return the value under `key` if it is present and servable.
    ///
    /// A stale or expired entry counts as a miss; its value is retained for
    /// [`peek`](QueryStore::peek) until a re-fetch replaces it.
    #[tracing::instrument(skip(self, key))]
    pub async fn get_fresh(&self, key: &QueryKey) -> Option<serde_json::Value> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_fresh() => {
                tracing::debug!("cache hit");
                self.metrics.record_hit();
                Some(entry.value().clone())
            }
            Some(_) => {
                tracing::debug!("cache entry stale");
                self.metrics.record_miss();
                None
            }
            None => {
                tracing::debug!("cache miss");
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Return the stored value and its freshness without touching recency
    /// order or metrics.
    pub async fn peek(&self, key: &QueryKey) -> Option<(serde_json::Value, Freshness)> {
        let entries = self.entries.read().await;
        entries.peek(key).map(|entry| {
            let freshness = if entry.is_fresh() {
                Freshness::Fresh
            } else {
                Freshness::Stale
            };
            (entry.value().clone(), freshness)
        })
    }

    /// Store a fresh value under `key`, applying the configured
    /// time-to-live for the key's domain.
    #[tracing::instrument(skip(self, key, value))]
    pub async fn insert(&self, key: &QueryKey, value: serde_json::Value) {
        let entry = CacheEntry::new(value, self.config.ttl_for(key));

        let mut entries = self.entries.write().await;
        // The capacity check must happen under the lock to count evictions
        // reliably.
        let will_evict = entries.len() >= entries.cap().get() && !entries.contains(key);
        entries.put(key.clone(), entry);

        if will_evict {
            tracing::debug!("lru eviction");
            self.metrics.record_eviction();
        }
        tracing::trace!(key = %key, "entry stored");
    }

    /// Flag the entry under `key` for re-fetch.
    ///
    /// Idempotent: returns `true` only when the entry transitioned from
    /// fresh to stale; a missing or already-stale entry is a no-op.
    #[tracing::instrument(skip(self, key))]
    pub async fn mark_stale(&self, key: &QueryKey) -> bool {
        let mut entries = self.entries.write().await;
        match entries.peek_mut(key) {
            Some(entry) if entry.mark_stale() => {
                tracing::debug!("entry marked stale");
                self.metrics.record_invalidation();
                true
            }
            Some(_) => {
                tracing::trace!("entry already stale");
                false
            }
            None => {
                tracing::trace!("no entry under key");
                false
            }
        }
    }

    /// Flag every entry whose key descends from `prefix` for re-fetch,
    /// returning how many entries transitioned.
    ///
    /// Best-effort and idempotent: entries that are already stale, and
    /// prefixes matching nothing, leave the store unchanged.
    #[tracing::instrument(skip(self, prefix))]
    pub async fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write().await;
        let mut marked = 0usize;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) && entry.mark_stale() {
                marked += 1;
            }
        }

        if marked > 0 {
            tracing::debug!(prefix = %prefix, count = %marked, "entries marked stale");
            self.metrics.record_invalidations(marked as u64);
        } else {
            tracing::trace!(prefix = %prefix, "no fresh entries under prefix");
        }
        marked
    }

    /// Remove the entry under `key`, returning its value.
    pub async fn remove(&self, key: &QueryKey) -> Option<serde_json::Value> {
        let mut entries = self.entries.write().await;
        entries.pop(key).map(CacheEntry::into_value)
    }

    /// Remove every entry. Intended for application or session teardown.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        if count > 0 {
            tracing::debug!(count = %count, "store cleared");
        }
        count
    }

    /// Remove entries whose time-to-live has elapsed, returning the count.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let expired: Vec<QueryKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            entries.pop(&key);
        }
        if count > 0 {
            tracing::debug!(removed = %count, "expired entries removed");
        }
        count
    }

    /// True when an entry (fresh or stale) exists under `key`.
    pub async fn contains(&self, key: &QueryKey) -> bool {
        let entries = self.entries.read().await;
        entries.contains(key)
    }

    /// Number of stored entries, including stale ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of entry counts and activity counters.
    pub async fn stats(&self) -> StoreStats {
        let entries = self.entries.read().await;
        let total = entries.len();
        let stale = entries.iter().filter(|(_, e)| !e.is_fresh()).count();

        StoreStats {
            entries: total,
            stale_entries: stale,
            max_entries: self.config.max_entries,
            hits: self.metrics.hits(),
            misses: self.metrics.misses(),
            hit_ratio: self.metrics.hit_ratio(),
            evictions: self.metrics.evictions(),
            invalidations: self.metrics.invalidations(),
            fetches: self.metrics.fetches(),
            joined_fetches: self.metrics.joined_fetches(),
        }
    }

    /// Reset all activity counters to zero.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total entries currently stored.
    pub entries: usize,
    /// Entries flagged stale or past their time-to-live.
    pub stale_entries: usize,
    /// Configured entry limit.
    pub max_entries: usize,
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads that found no servable entry.
    pub misses: u64,
    /// Hits divided by total reads (0.0 with no reads).
    pub hit_ratio: f64,
    /// Entries displaced by the LRU policy.
    pub evictions: u64,
    /// Fresh-to-stale transitions.
    pub invalidations: u64,
    /// Underlying fetches started.
    pub fetches: u64,
    /// Reads that joined an already in-flight fetch.
    pub joined_fetches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_ENTRIES;
    use serde_json::json;
    use tokio::time::sleep;

    mod test_constants {
        use std::time::Duration;

        /// Short TTL for expiration tests (50ms)
        pub const SHORT_TTL: Duration = Duration::from_millis(50);

        /// Wait time that guarantees SHORT_TTL has elapsed (100ms)
        pub const EXPIRY_WAIT: Duration = Duration::from_millis(100);
    }

    fn list_key() -> QueryKey {
        QueryKey::root("products")
            .op("list")
            .params(Some(json!({"page": 1})))
    }

    fn detail_key(id: &str) -> QueryKey {
        QueryKey::root("products").op("detail").id(Some(id))
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!({"items": [1, 2]})).await;

        assert_eq!(
            store.get_fresh(&list_key()).await,
            Some(json!({"items": [1, 2]}))
        );
    }

    #[tokio::test]
    async fn get_on_absent_key_is_a_miss() {
        let store = QueryStore::new(StoreConfig::new());
        assert_eq!(store.get_fresh(&list_key()).await, None);

        let stats = store.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn round_trip_has_no_cross_talk() {
        let store = QueryStore::new(StoreConfig::new());
        let abc = QueryKey::from(["media", "data", "item", "abc"]);
        let abcd = QueryKey::from(["media", "data", "item", "abcd"]);

        store.insert(&abc, json!("short")).await;
        store.insert(&abcd, json!("long")).await;

        assert_eq!(store.get_fresh(&abc).await, Some(json!("short")));
        assert_eq!(store.get_fresh(&abcd).await, Some(json!("long")));
    }

    #[tokio::test]
    async fn mark_stale_keeps_last_known_value() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&detail_key("p1"), json!({"name": "old"})).await;

        assert!(store.mark_stale(&detail_key("p1")).await);
        assert_eq!(store.get_fresh(&detail_key("p1")).await, None);
        assert_eq!(
            store.peek(&detail_key("p1")).await,
            Some((json!({"name": "old"}), Freshness::Stale))
        );
    }

    #[tokio::test]
    async fn mark_stale_is_idempotent() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&detail_key("p1"), json!(1)).await;

        assert!(store.mark_stale(&detail_key("p1")).await);
        assert!(!store.mark_stale(&detail_key("p1")).await);
        assert!(!store.mark_stale(&detail_key("missing")).await);

        let stats = store.stats().await;
        assert_eq!(stats.invalidations, 1);
    }

    #[tokio::test]
    async fn invalidate_prefix_marks_descendants_only() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!([1])).await;
        store.insert(&detail_key("p1"), json!({"id": "p1"})).await;
        store
            .insert(&QueryKey::root("votes").op("tally"), json!(9))
            .await;

        let marked = store
            .invalidate_prefix(&QueryKey::root("products"))
            .await;
        assert_eq!(marked, 2);

        assert_eq!(store.get_fresh(&list_key()).await, None);
        assert_eq!(store.get_fresh(&detail_key("p1")).await, None);
        assert_eq!(
            store.get_fresh(&QueryKey::root("votes").op("tally")).await,
            Some(json!(9))
        );
    }

    #[tokio::test]
    async fn invalidate_prefix_twice_matches_invalidating_once() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!([1])).await;

        let first = store
            .invalidate_prefix(&QueryKey::from(["products", "list"]))
            .await;
        let second = store
            .invalidate_prefix(&QueryKey::from(["products", "list"]))
            .await;

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.stats().await.invalidations, 1);
    }

    #[tokio::test]
    async fn narrower_key_not_invalidated_by_non_ancestor() {
        let store = QueryStore::new(StoreConfig::new());
        let abc = QueryKey::from(["media", "data", "item", "abc"]);
        store.insert(&abc, json!(1)).await;

        let marked = store
            .invalidate_prefix(&QueryKey::from(["media", "data", "item", "abcd"]))
            .await;
        assert_eq!(marked, 0);
        assert_eq!(store.get_fresh(&abc).await, Some(json!(1)));
    }

    #[tokio::test]
    async fn lru_eviction_at_capacity() {
        let store = QueryStore::new(StoreConfig::new().with_max_entries(2));
        store.insert(&detail_key("a"), json!(1)).await;
        store.insert(&detail_key("b"), json!(2)).await;
        store.insert(&detail_key("c"), json!(3)).await;

        assert_eq!(store.get_fresh(&detail_key("a")).await, None);
        assert_eq!(store.get_fresh(&detail_key("b")).await, Some(json!(2)));
        assert_eq!(store.get_fresh(&detail_key("c")).await, Some(json!(3)));
        assert_eq!(store.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn expired_entry_counts_as_stale() {
        use test_constants::*;

        let store = QueryStore::new(StoreConfig::new().with_default_ttl(SHORT_TTL));
        store.insert(&list_key(), json!([1])).await;

        assert_eq!(store.get_fresh(&list_key()).await, Some(json!([1])));
        sleep(EXPIRY_WAIT).await;

        assert_eq!(store.get_fresh(&list_key()).await, None);
        assert_eq!(
            store.peek(&list_key()).await,
            Some((json!([1]), Freshness::Stale))
        );
    }

    #[tokio::test]
    async fn cleanup_expired_removes_only_expired() {
        use test_constants::*;

        let store = QueryStore::new(
            StoreConfig::new().with_domain_ttl("products", SHORT_TTL),
        );
        store.insert(&list_key(), json!([1])).await;
        store
            .insert(&QueryKey::root("votes").op("tally"), json!(9))
            .await;

        sleep(EXPIRY_WAIT).await;

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.contains(&QueryKey::root("votes").op("tally")).await);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!([1])).await;
        store.insert(&detail_key("p1"), json!(1)).await;

        assert_eq!(store.clear().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn stats_track_stale_entries() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!([1])).await;
        store.insert(&detail_key("p1"), json!(1)).await;
        store.mark_stale(&detail_key("p1")).await;

        let stats = store.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.stale_entries, 1);
        assert_eq!(stats.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[tokio::test]
    async fn reset_metrics_zeroes_counters() {
        let store = QueryStore::new(StoreConfig::new());
        store.insert(&list_key(), json!([1])).await;
        store.get_fresh(&list_key()).await;
        store.get_fresh(&detail_key("missing")).await;

        store.reset_metrics();
        let stats = store.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }
}
