#![warn(missing_docs)]
//! # query-cache
//!
//! A hierarchical query-key cache with mutation-driven invalidation for
//! client-side data access.
//!
//! ## Overview
//!
//! Data-access layers tend to re-derive two pieces of logic at every call
//! site: how a request's parameters become a stable cache identity, and
//! which cached reads a mutation must invalidate. This crate centralizes
//! both:
//!
//! - **Keys** ([`QueryKey`]) are ordered segment sequences, most general
//!   first (`domain / operation / parameters`), built through a pure,
//!   deterministic, never-failing builder with one shared normalization
//!   rule ([`normalize_params`]): an empty parameter object and an absent
//!   one produce the same key.
//! - **Invalidation** ([`InvalidationRules`]) maps each mutation identity
//!   to key prefixes, declared once. After a mutation succeeds, every
//!   stored entry descending from a declared prefix is flagged stale and
//!   re-fetched on its next read; nothing is re-fetched eagerly.
//! - **The store** ([`QueryStore`]) is an injected, bounded, thread-safe
//!   map from keys to values with per-key atomic updates, LRU eviction,
//!   optional time-to-live, and activity metrics.
//! - **The client** ([`QueryClient`]) pairs the store with caller-supplied
//!   async fetch/mutation functions, collapsing concurrent identical reads
//!   into a single underlying fetch.
//!
//! Transport is someone else's job: fetch and mutation functions are
//! supplied by the caller, and their failures pass through verbatim as
//! [`TransportError`] with no retries and no interpretation.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use query_cache::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(QueryStore::new(StoreConfig::new()));
//! let client = QueryClient::new(store).with_rules(
//!     InvalidationRules::new()
//!         .prefix("products.delete", ["products", "list"])
//!         .derived("products.delete", |vars, _result| {
//!             vec![QueryKey::root("products").op("detail").id(vars.get("id").cloned())]
//!         }),
//! );
//!
//! // Read: served from cache when fresh, fetched otherwise. Concurrent
//! // reads of the same key share one fetch.
//! let key = QueryKey::root("products")
//!     .op("list")
//!     .params(Some(json!({"status": "draft", "page": 1})));
//! let products = client.fetch(key, || api.list_products()).await?;
//!
//! // Mutate: on success, the declared prefixes are flagged stale.
//! client
//!     .mutate("products.delete", json!({"id": "p1"}), |vars| api.delete(vars))
//!     .await?;
//! ```
//!
//! ## Module structure
//!
//! - [`key`]: key segments, parameter normalization, the key builder
//! - [`entry`]: stored entries, freshness, observable per-key state
//! - [`store`]: the shared bounded store and its statistics
//! - [`invalidation`]: mutation-to-prefix rules and the dispatcher
//! - [`client`]: read/mutate accessors and fetch de-duplication
//! - [`config`]: store configuration
//! - [`error`]: the pass-through transport error

pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod invalidation;
pub mod key;
mod metrics;
pub mod store;

pub use client::{FetchId, QueryClient};
pub use config::{DEFAULT_MAX_ENTRIES, StoreConfig};
pub use entry::{CacheEntry, Freshness, QueryState};
pub use error::{QueryResult, TransportError};
pub use invalidation::InvalidationRules;
pub use key::{KeySegment, Params, QueryKey, normalize_params};
pub use store::{QueryStore, StoreStats};

/// Convenient single-statement import of the public API.
pub mod prelude {
    pub use crate::{
        CacheEntry, DEFAULT_MAX_ENTRIES, FetchId, Freshness, InvalidationRules, KeySegment,
        Params, QueryClient, QueryKey, QueryResult, QueryState, QueryStore, StoreConfig,
        StoreStats, TransportError, normalize_params,
    };
}
