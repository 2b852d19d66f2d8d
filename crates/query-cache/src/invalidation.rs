//! Mutation-to-prefix invalidation rules
//!
//! Each mutation identity maps to one or more key prefixes; after the
//! mutation's side effect is acknowledged successful, every stored entry
//! descending from a declared prefix is flagged stale. Rules are declared
//! once, up front. A rule is either a static prefix list or a function
//! deriving entity-specific prefixes from the mutation's variables and
//! result. The usual shape is the specific entity's key plus the domain's
//! list prefix as a conservative fallback.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::key::QueryKey;
use crate::store::QueryStore;

type DeriveFn = Arc<dyn Fn(&Value, &Value) -> Vec<QueryKey> + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Static(Vec<QueryKey>),
    Derived(DeriveFn),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(prefixes) => f.debug_tuple("Static").field(prefixes).finish(),
            Self::Derived(_) => f.debug_tuple("Derived").field(&"<fn>").finish(),
        }
    }
}

/// Declarative mapping from mutation identities to the key prefixes they
/// invalidate.
///
/// ```
/// use query_cache::{InvalidationRules, QueryKey};
///
/// let rules = InvalidationRules::new()
///     .prefix("products.delete", ["products", "list"])
///     .derived("products.delete", |vars, _result| {
///         vec![QueryKey::root("products").op("detail").id(vars.get("id").cloned())]
///     });
///
/// assert!(rules.covers("products.delete"));
/// assert!(!rules.covers("products.create"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvalidationRules {
    rules: HashMap<String, Vec<Rule>>,
}

impl InvalidationRules {
    /// An empty rule set; mutations without rules invalidate nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a single static prefix for `mutation`.
    #[must_use = "this method returns a new InvalidationRules and does not modify self"]
    pub fn prefix(self, mutation: impl Into<String>, prefix: impl Into<QueryKey>) -> Self {
        self.prefixes(mutation, [prefix])
    }

    /// Declare several static prefixes for `mutation`.
    #[must_use = "this method returns a new InvalidationRules and does not modify self"]
    pub fn prefixes<P>(
        mut self,
        mutation: impl Into<String>,
        prefixes: impl IntoIterator<Item = P>,
    ) -> Self
    where
        P: Into<QueryKey>,
    {
        self.rules
            .entry(mutation.into())
            .or_default()
            .push(Rule::Static(
                prefixes.into_iter().map(Into::into).collect(),
            ));
        self
    }

    /// Declare a rule deriving prefixes from the mutation's variables and
    /// result, for entity-specific invalidation.
    #[must_use = "this method returns a new InvalidationRules and does not modify self"]
    pub fn derived(
        mut self,
        mutation: impl Into<String>,
        derive: impl Fn(&Value, &Value) -> Vec<QueryKey> + Send + Sync + 'static,
    ) -> Self {
        self.rules
            .entry(mutation.into())
            .or_default()
            .push(Rule::Derived(Arc::new(derive)));
        self
    }

    /// True when at least one rule is declared for `mutation`.
    pub fn covers(&self, mutation: &str) -> bool {
        self.rules.contains_key(mutation)
    }

    /// Every prefix affected by `mutation`, static and derived.
    ///
    /// Pure computation; ordering follows declaration order.
    pub fn prefixes_for(&self, mutation: &str, vars: &Value, result: &Value) -> Vec<QueryKey> {
        let Some(rules) = self.rules.get(mutation) else {
            return Vec::new();
        };

        let mut prefixes = Vec::new();
        for rule in rules {
            match rule {
                Rule::Static(declared) => prefixes.extend(declared.iter().cloned()),
                Rule::Derived(derive) => prefixes.extend(derive(vars, result)),
            }
        }
        prefixes
    }

    /// Flag every entry descending from the prefixes declared for
    /// `mutation`, returning how many entries transitioned.
    ///
    /// Call only after the mutation's side effect is confirmed successful;
    /// a failed mutation must leave the store untouched. Dispatch itself is
    /// best-effort, idempotent, and performs no I/O beyond the store.
    #[tracing::instrument(skip(self, store, vars, result))]
    pub async fn dispatch(
        &self,
        store: &QueryStore,
        mutation: &str,
        vars: &Value,
        result: &Value,
    ) -> usize {
        let prefixes = self.prefixes_for(mutation, vars, result);
        if prefixes.is_empty() {
            tracing::trace!("no invalidation rules for mutation");
            return 0;
        }

        let mut marked = 0;
        for prefix in &prefixes {
            marked += store.invalidate_prefix(prefix).await;
        }
        tracing::debug!(
            prefixes = %prefixes.len(),
            marked = %marked,
            "invalidation dispatched"
        );
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use serde_json::json;

    fn delete_rules() -> InvalidationRules {
        InvalidationRules::new()
            .prefix("products.delete", ["products", "list"])
            .derived("products.delete", |vars, _| {
                vec![QueryKey::root("products").op("detail").id(vars.get("id").cloned())]
            })
    }

    #[test]
    fn static_and_derived_prefixes_combine() {
        let rules = delete_rules();
        let prefixes =
            rules.prefixes_for("products.delete", &json!({"id": "p1"}), &json!({"ok": true}));

        assert_eq!(
            prefixes,
            vec![
                QueryKey::from(["products", "list"]),
                QueryKey::root("products").op("detail").id(Some("p1")),
            ]
        );
    }

    #[test]
    fn unknown_mutation_has_no_prefixes() {
        let rules = delete_rules();
        assert!(rules
            .prefixes_for("products.create", &json!({}), &json!({}))
            .is_empty());
        assert!(!rules.covers("products.create"));
    }

    #[test]
    fn derived_rule_with_missing_id_targets_the_null_placeholder() {
        let rules = delete_rules();
        let prefixes = rules.prefixes_for("products.delete", &json!({}), &json!({}));

        assert_eq!(
            prefixes[1],
            QueryKey::root("products").op("detail").id(None::<&str>)
        );
    }

    #[tokio::test]
    async fn dispatch_marks_descendants_stale() {
        let store = QueryStore::new(StoreConfig::new());
        let list = QueryKey::root("products")
            .op("list")
            .params(Some(json!({"page": 1})));
        let detail = QueryKey::root("products").op("detail").id(Some("p1"));
        let other = QueryKey::root("media").op("item").id(Some("m1"));

        store.insert(&list, json!([1])).await;
        store.insert(&detail, json!({"id": "p1"})).await;
        store.insert(&other, json!({"id": "m1"})).await;

        let marked = delete_rules()
            .dispatch(&store, "products.delete", &json!({"id": "p1"}), &json!({}))
            .await;

        assert_eq!(marked, 2);
        assert_eq!(store.get_fresh(&list).await, None);
        assert_eq!(store.get_fresh(&detail).await, None);
        assert_eq!(store.get_fresh(&other).await, Some(json!({"id": "m1"})));
    }

    #[tokio::test]
    async fn dispatch_twice_is_idempotent() {
        let store = QueryStore::new(StoreConfig::new());
        let list = QueryKey::from(["products", "list"]);
        store.insert(&list, json!([1])).await;

        let rules = delete_rules();
        let vars = json!({"id": "p1"});
        let first = rules
            .dispatch(&store, "products.delete", &vars, &json!({}))
            .await;
        let second = rules
            .dispatch(&store, "products.delete", &vars, &json!({}))
            .await;

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.stats().await.invalidations, 1);
    }

    #[tokio::test]
    async fn dispatch_without_rules_is_a_no_op() {
        let store = QueryStore::new(StoreConfig::new());
        let key = QueryKey::from(["products", "list"]);
        store.insert(&key, json!([1])).await;

        let marked = InvalidationRules::new()
            .dispatch(&store, "products.delete", &json!({}), &json!({}))
            .await;

        assert_eq!(marked, 0);
        assert_eq!(store.get_fresh(&key).await, Some(json!([1])));
    }
}
