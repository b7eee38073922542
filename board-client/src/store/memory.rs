//! In-process backend for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, StoreError};

type Collections = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
struct Handle {
    offline: AtomicBool,
    fail_next: AtomicUsize,
    open_calls: AtomicUsize,
    open_delay: Mutex<Option<Duration>>,
}

/// In-memory document store.
///
/// [`MemoryBackend::peer`] returns a second handle onto the same documents,
/// which is how tests model two peers replicating through one store. Each
/// handle can be taken offline on its own.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    docs: Arc<Mutex<Collections>>,
    handle: Arc<Handle>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle onto the same documents with its own connectivity.
    pub fn peer(&self) -> Self {
        Self {
            docs: Arc::clone(&self.docs),
            handle: Arc::new(Handle::default()),
        }
    }

    /// Make every call through this handle fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.handle.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `count` non-open calls with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.handle.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delay `open` so tests can observe concurrent initialisation.
    pub fn set_open_delay(&self, delay: Duration) {
        *self
            .handle
            .open_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    /// How many times `open` ran on this handle.
    pub fn open_calls(&self) -> usize {
        self.handle.open_calls.load(Ordering::SeqCst)
    }

    /// Write a raw document, bypassing any validation.
    pub fn insert_raw(&self, collection: &str, id: &str, doc: Value) {
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.get(collection).map_or(0, BTreeMap::len)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.handle.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        let consumed = self
            .handle
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(StoreError::Unavailable("store not initialised".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn open(&self) -> Result<(), StoreError> {
        self.handle.open_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .handle
            .open_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.handle.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.check()?;
        self.insert_raw(collection, id, doc);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.check()?;
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(docs
            .get_mut(collection)
            .is_some_and(|c| c.remove(id).is_some()))
    }
}
