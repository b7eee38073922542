//! Content-addressed object storage.
//!
//! This module provides the [`ContentStore`] trait over a content-addressed
//! node, JSON helpers layered on top of it, and a memory-based
//! implementation for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use board_types::ContentId;
use dashmap::{DashMap, DashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ContentError;

/// Options for [`ContentStore::put_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// File name recorded by the node.
    pub filename: Option<String>,
    /// Declared mime type.
    pub mime_type: Option<String>,
    /// Ask the node to pin the content as part of the write.
    pub pin: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            filename: None,
            mime_type: None,
            pin: true,
        }
    }
}

impl PutOptions {
    /// Options for a named file of a given type.
    pub fn file(filename: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            mime_type,
            pin: true,
        }
    }
}

/// Result of a best-effort pin request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PinOutcome {
    /// The content will be persisted.
    Pinned,
    /// Refused by quota or plan tier. The content is still shared.
    LimitedPlan {
        /// What the service said.
        reason: String,
    },
    /// The request failed.
    Failed {
        /// Error description.
        reason: String,
    },
}

impl PinOutcome {
    /// Whether the pin succeeded.
    pub fn is_pinned(&self) -> bool {
        matches!(self, PinOutcome::Pinned)
    }
}

/// Trait for content-addressed object storage.
///
/// Identifiers are derived from the exact stored bytes, so storing the same
/// bytes twice yields the same identifier.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their identifier.
    ///
    /// Fails with `StorageFailure` if the node is unreachable.
    async fn put_bytes(&self, bytes: &[u8], options: PutOptions) -> Result<ContentId, ContentError>;

    /// Retrieve bytes by identifier.
    ///
    /// Returns `NotFound` if the identifier is not in the store.
    async fn get_bytes(&self, cid: &ContentId) -> Result<Vec<u8>, ContentError>;

    /// Request persistence. Never fails; the outcome says what happened.
    async fn pin(&self, cid: &ContentId) -> PinOutcome;
}

/// JSON documents on top of any [`ContentStore`].
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    /// Serialize `value` as JSON and store it.
    ///
    /// Serialization is not canonicalised, so the same logical value may
    /// produce different identifiers across calls.
    async fn put_json<T>(&self, value: &T) -> Result<ContentId, ContentError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        let options = PutOptions {
            filename: Some("data.json".into()),
            mime_type: Some("application/json".into()),
            pin: true,
        };
        self.put_bytes(&bytes, options).await
    }

    /// Fetch and decode a JSON document.
    async fn get_json<T>(&self, cid: &ContentId) -> Result<T, ContentError>
    where
        T: DeserializeOwned + Send,
    {
        let bytes = self.get_bytes(cid).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    async fn put_bytes(&self, bytes: &[u8], options: PutOptions) -> Result<ContentId, ContentError> {
        (**self).put_bytes(bytes, options).await
    }

    async fn get_bytes(&self, cid: &ContentId) -> Result<Vec<u8>, ContentError> {
        (**self).get_bytes(cid).await
    }

    async fn pin(&self, cid: &ContentId) -> PinOutcome {
        (**self).pin(cid).await
    }
}

/// Identifier the memory store assigns to `bytes`: `b3` + hex BLAKE3 digest.
pub fn memory_cid(bytes: &[u8]) -> Result<ContentId, ContentError> {
    let digest = hex::encode(blake3::hash(bytes).as_bytes());
    ContentId::parse(&format!("b3{digest}"))
        .map_err(|e| ContentError::InvalidResponse(e.to_string()))
}

#[derive(Default)]
struct MemoryInner {
    blobs: DashMap<ContentId, Vec<u8>>,
    pinned: DashSet<ContentId>,
    offline: AtomicBool,
    limited_plan: AtomicBool,
}

/// In-memory content store for testing.
///
/// Clones share the same blobs. Not persistent - all data is lost when the
/// last clone is dropped. Can be switched offline or onto a limited plan to
/// exercise failure paths.
#[derive(Default, Clone)]
pub struct MemoryContentStore {
    inner: Arc<MemoryInner>,
}

impl MemoryContentStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable node.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every pin request come back as `LimitedPlan`.
    pub fn set_limited_plan(&self, limited: bool) {
        self.inner.limited_plan.store(limited, Ordering::SeqCst);
    }

    /// Whether `cid` has been pinned.
    pub fn is_pinned(&self, cid: &ContentId) -> bool {
        self.inner.pinned.contains(cid)
    }

    /// Get the number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.inner.blobs.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.blobs.is_empty()
    }

    /// Drop a blob, as a node garbage collector would.
    pub fn evict(&self, cid: &ContentId) -> bool {
        self.inner.pinned.remove(cid);
        self.inner.blobs.remove(cid).is_some()
    }

    fn check_online(&self) -> Result<(), ContentError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(ContentError::StorageFailure("content node offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put_bytes(&self, bytes: &[u8], options: PutOptions) -> Result<ContentId, ContentError> {
        self.check_online()?;
        let cid = memory_cid(bytes)?;
        self.inner.blobs.insert(cid.clone(), bytes.to_vec());
        if options.pin && !self.inner.limited_plan.load(Ordering::SeqCst) {
            self.inner.pinned.insert(cid.clone());
        }
        Ok(cid)
    }

    async fn get_bytes(&self, cid: &ContentId) -> Result<Vec<u8>, ContentError> {
        self.check_online()?;
        self.inner
            .blobs
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContentError::NotFound {
                cid: cid.to_string(),
            })
    }

    async fn pin(&self, cid: &ContentId) -> PinOutcome {
        if self.inner.offline.load(Ordering::SeqCst) {
            return PinOutcome::Failed {
                reason: "content node offline".into(),
            };
        }
        if self.inner.limited_plan.load(Ordering::SeqCst) {
            return PinOutcome::LimitedPlan {
                reason: "PAID_FEATURE_ONLY".into(),
            };
        }
        if !self.inner.blobs.contains_key(cid) {
            return PinOutcome::Failed {
                reason: format!("unknown content {cid}"),
            };
        }
        self.inner.pinned.insert(cid.clone());
        PinOutcome::Pinned
    }
}
