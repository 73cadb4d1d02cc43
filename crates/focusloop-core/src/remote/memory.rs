//! In-memory remote store.
//!
//! Backs the sync engine tests and offline operation. Mirrors the HTTP
//! store's observable behavior, including `update` failing on a missing
//! document.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{merge_fields, Document, RemoteError, RemoteStore};

type Collections = HashMap<(String, String), HashMap<String, Value>>;

/// HashMap-backed [`RemoteStore`].
#[derive(Default)]
pub struct MemoryRemoteStore {
    // (owner, collection) -> doc_id -> fields
    data: Mutex<Collections>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in one owner's collection (test helper).
    pub async fn len(&self, owner: &str, collection: &str) -> usize {
        self.data
            .lock()
            .await
            .get(&(owner.to_string(), collection.to_string()))
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, owner: &str, collection: &str) -> bool {
        self.len(owner, collection).await == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        let data = self.data.lock().await;
        Ok(data
            .get(&(owner.to_string(), collection.to_string()))
            .and_then(|docs| docs.get(doc_id))
            .map(|fields| Document {
                id: doc_id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn set(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
        merge: bool,
    ) -> Result<(), RemoteError> {
        let mut data = self.data.lock().await;
        let docs = data
            .entry((owner.to_string(), collection.to_string()))
            .or_default();
        let value = if merge {
            match docs.get(doc_id) {
                Some(existing) => merge_fields(existing, &fields),
                None => fields,
            }
        } else {
            fields
        };
        docs.insert(doc_id.to_string(), value);
        Ok(())
    }

    async fn update(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        let mut data = self.data.lock().await;
        let docs = data
            .entry((owner.to_string(), collection.to_string()))
            .or_default();
        match docs.get(doc_id) {
            Some(existing) => {
                let merged = merge_fields(existing, &fields);
                docs.insert(doc_id.to_string(), merged);
                Ok(())
            }
            None => Err(RemoteError::Api(format!(
                "update of missing document {collection}/{doc_id}"
            ))),
        }
    }

    async fn list(&self, owner: &str, collection: &str) -> Result<Vec<Document>, RemoteError> {
        let data = self.data.lock().await;
        Ok(data
            .get(&(owner.to_string(), collection.to_string()))
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
