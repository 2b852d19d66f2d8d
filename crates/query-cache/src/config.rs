//! Store configuration

use std::collections::HashMap;
use std::time::Duration;

use crate::key::{KeySegment, QueryKey};

/// Default maximum number of store entries
///
/// Bounds memory growth while leaving enough capacity for typical client
/// caches; the LRU policy keeps the most recently used entries when the
/// limit is reached.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Configuration for a [`QueryStore`](crate::QueryStore).
///
/// By default entries carry no time-to-live: they stay fresh until a
/// mutation (or a manual call) invalidates them. Domains that tolerate
/// bounded staleness can opt into expiry with [`StoreConfig::with_default_ttl`]
/// or per-domain overrides.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of entries held before LRU eviction.
    pub max_entries: usize,
    /// Time-to-live applied to entries without a domain override.
    pub default_ttl: Option<Duration>,
    /// Per-domain time-to-live overrides, keyed by the root segment.
    pub domain_ttl: HashMap<String, Duration>,
}

impl StoreConfig {
    /// Configuration with defaults: 1000 entries, no time-based expiry.
    pub fn new() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: None,
            domain_ttl: HashMap::new(),
        }
    }

    /// Set the maximum number of entries.
    #[must_use = "this method returns a new StoreConfig and does not modify self"]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the default time-to-live for stored entries.
    #[must_use = "this method returns a new StoreConfig and does not modify self"]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set a time-to-live for every key rooted at `domain`.
    #[must_use = "this method returns a new StoreConfig and does not modify self"]
    pub fn with_domain_ttl(mut self, domain: impl Into<String>, ttl: Duration) -> Self {
        self.domain_ttl.insert(domain.into(), ttl);
        self
    }

    /// Time-to-live for a key: its domain override if one exists,
    /// otherwise the default.
    pub fn ttl_for(&self, key: &QueryKey) -> Option<Duration> {
        if let Some(KeySegment::Text(domain)) = key.segments().first()
            && let Some(ttl) = self.domain_ttl.get(domain)
        {
            return Some(*ttl);
        }
        self.default_ttl
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
