//! Error type surfaced by the read and mutate accessors

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure reported by an external fetch or mutation collaborator.
///
/// Carried through the cache verbatim: no retries, no fallback values, and
/// no interpretation of the message or details. A failed read leaves any
/// previously cached value untouched and readable as the last known good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable failure description from the collaborator.
    pub message: String,
    /// Optional structured payload from the collaborator, passed along
    /// uninspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TransportError {
    /// Create an error with a message and no details.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }
}

/// Result type for fetch and mutation operations.
pub type QueryResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_is_the_message() {
        let error = TransportError::new("connection refused");
        assert_eq!(error.to_string(), "connection refused");
    }

    #[test]
    fn details_pass_through_unmodified() {
        let error = TransportError::new("rejected")
            .with_details(json!({"status": 422, "field": "name"}));
        assert_eq!(
            error.details,
            Some(json!({"status": 422, "field": "name"}))
        );
    }

    #[test]
    fn serializes_without_empty_details() {
        let error = TransportError::new("boom");
        let rendered = serde_json::to_value(&error).unwrap();
        assert_eq!(rendered, json!({"message": "boom"}));
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<TransportError>();
        assert_sync::<TransportError>();
    }
}
