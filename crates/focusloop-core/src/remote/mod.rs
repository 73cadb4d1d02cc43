//! Remote document store adapter.
//!
//! The sync engine only ever sees this trait: per-collection document CRUD
//! keyed by owner identifier and document identifier, all asynchronous and
//! transiently fallible. The HTTP client is the production implementation;
//! the in-memory store backs tests and offline operation.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// Collection names used by the sync engine.
pub mod collections {
    pub const PROFILE: &str = "profile";
    pub const SETTINGS: &str = "settings";
    pub const TASKS: &str = "tasks";
    pub const SESSIONS: &str = "sessions";
}

/// Singleton document ids within the profile/settings collections.
pub const PROFILE_DOC_ID: &str = "profile";
pub const SETTINGS_DOC_ID: &str = "settings";

/// A remote document: opaque id plus a JSON field bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

/// Remote store failures. All of these are treated as transient by the
/// sync engine: the pass fails, local state stays untouched, and the next
/// trigger retries from scratch.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote store error: {0}")]
    Api(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid remote base URL: {0}")]
    InvalidUrl(String),
}

/// Per-collection document operations, keyed by owner and document id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one document, or `None` if it does not exist.
    async fn get(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Document>, RemoteError>;

    /// Create or replace a document. With `merge`, existing fields not
    /// present in `fields` are preserved.
    async fn set(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
        merge: bool,
    ) -> Result<(), RemoteError>;

    /// Update fields of an existing document.
    async fn update(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
    ) -> Result<(), RemoteError>;

    /// All documents in a collection for this owner.
    async fn list(&self, owner: &str, collection: &str) -> Result<Vec<Document>, RemoteError>;
}

/// Shallow-merge `incoming` into `existing` (object fields only).
pub(crate) fn merge_fields(existing: &Value, incoming: &Value) -> Value {
    match (existing.as_object(), incoming.as_object()) {
        (Some(base), Some(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_fields() {
        let existing = json!({"a": 1, "b": 2});
        let incoming = json!({"b": 3, "c": 4});
        assert_eq!(
            merge_fields(&existing, &incoming),
            json!({"a": 1, "b": 3, "c": 4})
        );
    }

    #[test]
    fn merge_with_non_object_replaces() {
        let existing = json!({"a": 1});
        let incoming = json!([1, 2]);
        assert_eq!(merge_fields(&existing, &incoming), json!([1, 2]));
    }
}
