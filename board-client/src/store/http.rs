//! Backend for a keyed document REST service.
//!
//! ```text
//! GET    /health
//! GET    /<collection>
//! GET    /<collection>/<id>
//! PUT    /<collection>/<id>
//! DELETE /<collection>/<id>
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;

use super::{Backend, StoreError};

/// [`Backend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// The service base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }
}

/// Turn a non-success response into the matching error.
async fn failure(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        StoreError::Unavailable(format!("{status}: {}", body.trim()))
    } else {
        StoreError::Rejected(format!("{status}: {}", body.trim()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn open(&self) -> Result<(), StoreError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            // A store that answers but is not healthy is not ready yet.
            let status = response.status();
            Err(StoreError::Unavailable(format!("health check returned {status}")))
        }
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let response = self
            .http
            .put(self.document_url(collection, id))
            .json(&doc)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure(response).await)
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let response = self.http.get(self.document_url(collection, id)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(failure(response).await),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let response = self.http.get(self.collection_url(collection)).send().await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        Ok(response.json().await?)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let response = self
            .http
            .delete(self.document_url(collection, id))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(failure(response).await),
        }
    }
}
