//! HTTP client for the remote document store.
//!
//! Speaks a small REST surface:
//!
//! ```text
//! GET    {base}/users/{owner}/{collection}            -> [{"id": ..., "fields": {...}}]
//! GET    {base}/users/{owner}/{collection}/{doc}      -> {"id": ..., "fields": {...}}
//! PUT    {base}/users/{owner}/{collection}/{doc}      <- fields   (?merge=true to merge)
//! PATCH  {base}/users/{owner}/{collection}/{doc}      <- fields
//! ```
//!
//! Authentication is an optional bearer token. The wire shape is private to
//! this client; the sync engine only sees [`Document`]s.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{Document, RemoteError, RemoteStore};

#[derive(Debug, Deserialize)]
struct WireDocument {
    id: String,
    #[serde(default)]
    fields: Value,
}

/// reqwest-backed [`RemoteStore`].
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        })
    }

    fn doc_url(&self, owner: &str, collection: &str, doc_id: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidUrl("base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("users");
            segments.push(owner);
            segments.push(collection);
            if let Some(doc_id) = doc_id {
                segments.push(doc_id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api(format!("{status}: {body}")))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        let url = self.doc_url(owner, collection, Some(doc_id))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let wire: WireDocument = check_status(response).await?.json().await?;
        Ok(Some(Document {
            id: wire.id,
            fields: wire.fields,
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
        let mut url = self.doc_url(owner, collection, Some(doc_id))?;
        if merge {
            url.query_pairs_mut().append_pair("merge", "true");
        }
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&fields)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn update(
        &self,
        owner: &str,
        collection: &str,
        doc_id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        let url = self.doc_url(owner, collection, Some(doc_id))?;
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(&fields)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn list(&self, owner: &str, collection: &str) -> Result<Vec<Document>, RemoteError> {
        let url = self.doc_url(owner, collection, None)?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let wire: Vec<WireDocument> = check_status(response).await?.json().await?;
        Ok(wire
            .into_iter()
            .map(|doc| Document {
                id: doc.id,
                fields: doc.fields,
            })
            .collect())
    }
}
