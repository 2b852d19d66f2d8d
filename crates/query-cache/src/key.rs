//! Query key construction and parameter normalization
//!
//! A [`QueryKey`] is an ordered sequence of segments, most general first:
//! domain root, then operation label, then identifying parameters. Two keys
//! are equal exactly when their segment sequences are deep-equal in order,
//! so prefix relationships are segment-wise and a key for `"abc"` never
//! collides with a key for `"abcd"`.
//!
//! Construction is pure and deterministic: identical logical inputs always
//! produce identical keys, regardless of call order, object identity, or
//! the insertion order of parameter object fields. Keys are rebuilt on every
//! read and never persisted.
//!
//! Parameter normalization lives in one place, [`normalize_params`]. The
//! rule callers rely on: an absent parameter set and an object with zero
//! fields both collapse to [`KeySegment::Null`], so `{}` and "no filter"
//! address the same cache entry. Arrays keep caller-supplied order; callers
//! that want order-independent filter lists must sort before building keys.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Render a JSON value in canonical form: object fields sorted by name,
/// arrays in their given order, strings escaped.
///
/// Used for parameter hashing and for log-friendly key display; the
/// canonical text of two values is equal iff the values are equal.
pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            // serde_json's default map is ordered by key, but sort explicitly
            // so canonical form does not depend on the map implementation.
            let mut pairs: Vec<_> = fields.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, name);
                out.push(':');
                write_canonical(out, field);
            }
            out.push('}');
        }
    }
}

fn write_escaped(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
}

/// A normalized, non-empty parameter object.
///
/// Fields are held sorted by name, so two parameter objects with the same
/// field/value pairs compare equal no matter how the caller assembled them.
/// The fields are copied out of the caller's value at construction; later
/// mutation of the caller's object cannot corrupt a stored key.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    fn from_object(fields: serde_json::Map<String, Value>) -> Self {
        Self(fields.into_iter().collect())
    }

    /// Look up a single parameter field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Number of parameter fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the object has zero fields.
    ///
    /// A [`Params`] produced by [`normalize_params`] is never empty; the
    /// empty object collapses to [`KeySegment::Null`] instead.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON text of the parameter object.
    pub fn canonical(&self) -> String {
        canonical_json(&self.to_value())
    }

    /// Rebuild the parameter object as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Eq for Params {}

impl Hash for Params {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Canonical text agrees with equality, so hashing it keeps the
        // Hash/Eq contract.
        state.write(self.canonical().as_bytes());
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// One element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum KeySegment {
    /// Literal text: domain roots, operation labels, string identifiers.
    Text(String),
    /// Integer identifier.
    Int(i64),
    /// Placeholder for an absent parameter set or a not-yet-known
    /// identifier. Distinct from every real identifier.
    Null,
    /// Normalized parameter object.
    Params(Params),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(n) => write!(f, "{n}"),
            Self::Null => f.write_str("null"),
            Self::Params(params) => f.write_str(&params.canonical()),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for KeySegment {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for KeySegment {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for KeySegment {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u32> for KeySegment {
    fn from(n: u32) -> Self {
        Self::Int(n.into())
    }
}

impl From<Params> for KeySegment {
    fn from(params: Params) -> Self {
        if params.is_empty() {
            Self::Null
        } else {
            Self::Params(params)
        }
    }
}

impl From<Value> for KeySegment {
    /// Any serializable value becomes a segment; this conversion never
    /// fails. Strings and integers map to their own segment kinds, `null`
    /// and `{}` collapse to the null sentinel, non-empty objects become
    /// normalized parameters, and everything else is folded into its
    /// canonical JSON text.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Text(n.to_string()),
            },
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Object(fields) if fields.is_empty() => Self::Null,
            Value::Object(fields) => Self::Params(Params::from_object(fields)),
            array @ Value::Array(_) => Self::Text(canonical_json(&array)),
        }
    }
}

/// Normalize an optional parameter value into a key segment.
///
/// `None`, JSON `null`, and an object with zero fields all produce
/// [`KeySegment::Null`], so semantically equivalent "no filter" calls share
/// one cache identity. Normalization is idempotent: normalizing the value a
/// normalized segment renders back to yields the same segment.
pub fn normalize_params(params: Option<&Value>) -> KeySegment {
    match params {
        None => KeySegment::Null,
        Some(value) => KeySegment::from(value.clone()),
    }
}

/// Ordered, hierarchical cache identity.
///
/// Build keys fluently from the domain root down:
///
/// ```
/// use query_cache::QueryKey;
/// use serde_json::json;
///
/// let list = QueryKey::root("products")
///     .op("list")
///     .params(Some(json!({"status": "draft", "page": 1})));
/// let detail = QueryKey::root("products").op("detail").id(Some("p1"));
///
/// assert!(detail.starts_with(&QueryKey::root("products")));
/// assert!(!detail.starts_with(&list));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Key consisting of a single domain-root segment.
    pub fn root(domain: impl Into<String>) -> Self {
        Self(vec![KeySegment::Text(domain.into())])
    }

    /// Append an operation (resource-kind) label.
    #[must_use = "builder methods return the extended key"]
    pub fn op(mut self, label: impl Into<String>) -> Self {
        self.0.push(KeySegment::Text(label.into()));
        self
    }

    /// Append an identifier segment; `None` appends the null placeholder.
    #[must_use = "builder methods return the extended key"]
    pub fn id(mut self, id: Option<impl Into<KeySegment>>) -> Self {
        self.0.push(match id {
            Some(id) => id.into(),
            None => KeySegment::Null,
        });
        self
    }

    /// Append a normalized parameter segment (see [`normalize_params`]).
    #[must_use = "builder methods return the extended key"]
    pub fn params(mut self, params: Option<Value>) -> Self {
        self.0.push(normalize_params(params.as_ref()));
        self
    }

    /// Append an arbitrary segment.
    #[must_use = "builder methods return the extended key"]
    pub fn push(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// The ordered segments of this key.
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty key (which is a prefix of every key).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` is a true ancestor of (or equal to) this key:
    /// every segment of `prefix` equals the corresponding segment here.
    ///
    /// Comparison is per whole segment, so `["media","item","abc"]` is not
    /// a descendant of `["media","item","abcd"]` or vice versa.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<KeySegment>> for QueryKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<KeySegment> for QueryKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<S: Into<KeySegment>, const N: usize> From<[S; N]> for QueryKey {
    fn from(segments: [S; N]) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }
}
