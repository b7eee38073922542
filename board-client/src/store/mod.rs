//! Replicated document store.
//!
//! A [`Backend`] is a keyed document set per named collection. The
//! [`ReplicatedStore`] adapter on top of it owns initialisation, typed
//! chat/message access and the strict decode step.

mod http;
mod memory;
mod replicated;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use replicated::{CollectionNames, QuarantinedDocument, ReplicatedStore, QUARANTINE_LIMIT};

/// Errors from the replicated store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store is not initialised or cannot be reached.
    #[error("replicated store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but refused the request.
    #[error("replicated store rejected request: {0}")]
    Rejected(String),

    /// A document could not be encoded or the response decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Serialization(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

/// Keyed document storage over named collections.
///
/// Documents are upserted by id; conflicts are last-writer-wins as decided
/// by the backend. `list` order is whatever the backend delivers.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Bring the backend up. Called once before first use and again after
    /// an `Unavailable` error.
    async fn open(&self) -> Result<(), StoreError>;

    /// Upsert a document.
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// All documents in a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Release resources. The backend may be opened again afterwards.
    async fn close(&self) {}
}
