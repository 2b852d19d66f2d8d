//! Stored cache entries and observable per-key state

use serde_json::Value;
use std::time::{Duration, Instant};

/// Freshness flag of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Entry may be served without re-fetching.
    Fresh,
    /// Entry is flagged for re-fetch on next access; its value remains
    /// available as the last known good.
    Stale,
}

/// A cached value with its freshness and optional time-to-live.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Value,
    freshness: Freshness,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create a fresh entry. `ttl` of `None` means the entry stays fresh
    /// until explicitly invalidated.
    pub fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// The cached value, regardless of freshness.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the entry, yielding its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The explicit freshness flag (ignores time-based expiry).
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Flag the entry for re-fetch. Returns `true` only when the entry
    /// actually transitioned, so repeated invalidation stays a no-op.
    pub fn mark_stale(&mut self) -> bool {
        if self.freshness == Freshness::Stale {
            return false;
        }
        self.freshness = Freshness::Stale;
        true
    }

    /// True once the entry's time-to-live has elapsed.
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.stored_at.elapsed() >= ttl,
            None => false,
        }
    }

    /// True when the entry may be served without re-fetching: flagged
    /// fresh and not past its time-to-live.
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh && !self.is_expired()
    }

    /// Time since the entry was stored.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Remaining time-to-live, if one was set.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.ttl
            .map(|ttl| ttl.saturating_sub(self.stored_at.elapsed()))
    }
}

/// Observable state of a single key.
///
/// Mirrors the entry lifecycle: a key is absent until its first read,
/// fetching while an underlying request is in flight, then fresh until an
/// invalidation (or expiry) flags it stale.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    /// No entry and no in-flight fetch.
    Absent,
    /// An underlying fetch is in flight; any previously stored value is
    /// still readable.
    Fetching {
        /// Last stored value, if the key was populated before.
        last_known: Option<Value>,
    },
    /// Entry present and servable.
    Fresh(Value),
    /// Entry present but flagged for re-fetch on next access.
    Stale(Value),
}

impl QueryState {
    /// The stored value visible in this state, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Absent => None,
            Self::Fetching { last_known } => last_known.as_ref(),
            Self::Fresh(value) | Self::Stale(value) => Some(value),
        }
    }

    /// True for [`QueryState::Stale`].
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_entries_are_fresh() {
        let entry = CacheEntry::new(json!({"id": 1}), None);
        assert!(entry.is_fresh());
        assert_eq!(entry.freshness(), Freshness::Fresh);
        assert!(!entry.is_expired());
    }

    #[test]
    fn mark_stale_transitions_once() {
        let mut entry = CacheEntry::new(json!(1), None);
        assert!(entry.mark_stale());
        assert!(!entry.mark_stale());
        assert!(!entry.is_fresh());
        assert_eq!(entry.value(), &json!(1));
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = CacheEntry::new(json!(1), None);
        assert_eq!(entry.remaining_ttl(), None);
        assert!(!entry.is_expired());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let entry = CacheEntry::new(json!(1), Some(Duration::ZERO));
        assert!(entry.is_expired());
        assert!(!entry.is_fresh());
        assert_eq!(entry.freshness(), Freshness::Fresh);
    }

    #[test]
    fn state_exposes_last_known_value() {
        let fetching = QueryState::Fetching {
            last_known: Some(json!("v1")),
        };
        assert_eq!(fetching.value(), Some(&json!("v1")));
        assert_eq!(QueryState::Absent.value(), None);
        assert!(QueryState::Stale(json!(1)).is_stale());
        assert!(!QueryState::Fresh(json!(1)).is_stale());
    }
}
