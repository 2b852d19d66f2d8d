//! Read and mutate accessors over a shared query store
//!
//! [`QueryClient`] wires the pure pieces together: reads are served from
//! the store when a fresh entry exists, otherwise an underlying fetch is
//! started through the caller-supplied async function; concurrent reads of
//! the same key collapse into one fetch. Mutations run the caller-supplied
//! executor and, only on success, dispatch the declared invalidation rules.
//!
//! Cancellation follows future semantics: dropping a read's future before
//! it resolves leaves the store untouched, and an in-flight fetch is
//! dropped once every read joined to it has been cancelled.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::entry::{Freshness, QueryState};
use crate::error::QueryResult;
use crate::invalidation::InvalidationRules;
use crate::key::QueryKey;
use crate::store::QueryStore;

type SharedFetch = Shared<BoxFuture<'static, QueryResult<Value>>>;
type WeakFetch = WeakShared<BoxFuture<'static, QueryResult<Value>>>;

/// Correlates one underlying fetch across every read joined to it.
///
/// UUID v7, so ids sort by start time in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchId(Uuid);

impl FetchId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-facing accessor pairing a [`QueryStore`] with invalidation rules
/// and an in-flight fetch table.
///
/// ```rust,ignore
/// let store = Arc::new(QueryStore::new(StoreConfig::new()));
/// let client = QueryClient::new(store).with_rules(
///     InvalidationRules::new().prefix("products.delete", ["products", "list"]),
/// );
///
/// let key = QueryKey::root("products").op("list").params(None);
/// let products = client.fetch(key, || api.list_products()).await?;
///
/// client
///     .mutate("products.delete", json!({"id": "p1"}), |vars| api.delete(vars))
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryClient {
    store: Arc<QueryStore>,
    rules: Arc<InvalidationRules>,
    in_flight: Arc<DashMap<QueryKey, WeakFetch>>,
}

impl QueryClient {
    /// Create a client over `store` with no invalidation rules.
    pub fn new(store: Arc<QueryStore>) -> Self {
        Self {
            store,
            rules: Arc::new(InvalidationRules::new()),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Attach the mutation invalidation rules.
    #[must_use = "this method returns a new QueryClient and does not modify self"]
    pub fn with_rules(mut self, rules: InvalidationRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// The store backing this client.
    pub fn store(&self) -> &Arc<QueryStore> {
        &self.store
    }

    /// Read the value under `key`, fetching through `fetch` when no fresh
    /// entry exists.
    ///
    /// Reads of the same key issued while a fetch is in flight join that
    /// fetch instead of starting another; `fetch` is then never invoked.
    /// A transport failure is returned verbatim and leaves any previously
    /// stored value untouched.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, fetch: F) -> QueryResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Value>> + Send + 'static,
    {
        if let Some(value) = self.store.get_fresh(&key).await {
            return Ok(value);
        }
        self.join_or_start(key, fetch).await
    }

    /// Execute `mutation` through `execute` and, on success, flag every
    /// entry covered by the declared rules for re-fetch.
    ///
    /// A failed execution propagates the error verbatim and performs no
    /// invalidation.
    pub async fn mutate<F, Fut>(
        &self,
        mutation: &str,
        vars: Value,
        execute: F,
    ) -> QueryResult<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = QueryResult<Value>>,
    {
        let result = execute(vars.clone()).await?;
        let marked = self
            .rules
            .dispatch(&self.store, mutation, &vars, &result)
            .await;
        tracing::debug!(mutation = %mutation, marked = %marked, "mutation acknowledged");
        Ok(result)
    }

    /// Observable state of `key`: absent, fetching, fresh, or stale.
    pub async fn state(&self, key: &QueryKey) -> QueryState {
        let fetching = match self.in_flight.get(key) {
            Some(slot) => slot.value().upgrade().is_some(),
            None => false,
        };

        let stored = self.store.peek(key).await;
        if fetching {
            return QueryState::Fetching {
                last_known: stored.map(|(value, _)| value),
            };
        }
        match stored {
            None => QueryState::Absent,
            Some((value, Freshness::Fresh)) => QueryState::Fresh(value),
            Some((value, Freshness::Stale)) => QueryState::Stale(value),
        }
    }

    /// Manually flag every entry descending from `prefix` for re-fetch.
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.store.invalidate_prefix(prefix).await
    }

    fn join_or_start<F, Fut>(&self, key: QueryKey, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Value>> + Send + 'static,
    {
        match self.in_flight.entry(key) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get().upgrade() {
                    self.store.metrics().record_joined_fetch();
                    tracing::debug!(key = %slot.key(), "joined in-flight fetch");
                    return existing;
                }
                // The previous fetch was abandoned by every caller; its
                // future is gone, so start over.
                let shared = self.start_fetch(slot.key().clone(), fetch);
                if let Some(weak) = shared.downgrade() {
                    slot.insert(weak);
                }
                shared
            }
            Entry::Vacant(slot) => {
                let shared = self.start_fetch(slot.key().clone(), fetch);
                if let Some(weak) = shared.downgrade() {
                    slot.insert(weak);
                }
                shared
            }
        }
    }

    fn start_fetch<F, Fut>(&self, key: QueryKey, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Value>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let fetch_id = FetchId::new();
        store.metrics().record_fetch();

        let fut = fetch();
        async move {
            tracing::debug!(fetch = %fetch_id, key = %key, "fetch started");
            let result = fut.await;
            match &result {
                Ok(value) => {
                    store.insert(&key, value.clone()).await;
                    tracing::debug!(fetch = %fetch_id, "fetch stored");
                }
                Err(error) => {
                    tracing::debug!(fetch = %fetch_id, error = %error, "fetch failed");
                }
            }
            in_flight.remove(&key);
            result
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
