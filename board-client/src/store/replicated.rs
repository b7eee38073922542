//! Lazily initialised, typed access to the replicated document store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use board_core::{InitEvent, InitState};
use board_types::{
    document_id, now_millis, Chat, ChatDocument, ChatId, Message, MessageDocument, MessageId,
    TypesError,
};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use super::{Backend, StoreError};

/// Maximum number of quarantined documents kept.
pub const QUARANTINE_LIMIT: usize = 100;

/// Names of the two replicated collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    /// Chat documents.
    pub chats: String,
    /// Message documents.
    pub messages: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            chats: "chats".to_string(),
            messages: "messages".to_string(),
        }
    }
}

/// A remote document that failed strict decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedDocument {
    /// Collection it was read from.
    pub collection: String,
    /// Its id, or `<unknown>`.
    pub id: String,
    /// Why it was rejected.
    pub reason: String,
}

#[derive(Debug, Default)]
struct InitCell {
    state: InitState,
    /// Completed open attempts, successful or not.
    attempts: u64,
}

/// Typed chat/message store over a [`Backend`].
///
/// The backend is opened on first use. Concurrent callers that arrive while
/// an open is in flight wait for it and share its result. A call that fails
/// with `Unavailable` marks the connection lost, reopens it, and is retried
/// once.
///
/// Remote documents are decoded strictly; anything that fails validation is
/// skipped and kept in a bounded quarantine log instead of reaching local
/// state.
pub struct ReplicatedStore {
    backend: Arc<dyn Backend>,
    names: CollectionNames,
    init: Mutex<InitCell>,
    init_lock: tokio::sync::Mutex<()>,
    quarantine: Mutex<VecDeque<QuarantinedDocument>>,
}

impl ReplicatedStore {
    /// Create a store with the default collection names.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_names(backend, CollectionNames::default())
    }

    /// Create a store with custom collection names.
    pub fn with_names(backend: Arc<dyn Backend>, names: CollectionNames) -> Self {
        Self {
            backend,
            names,
            init: Mutex::new(InitCell::default()),
            init_lock: tokio::sync::Mutex::new(()),
            quarantine: Mutex::new(VecDeque::new()),
        }
    }

    /// Collection names in use.
    pub fn names(&self) -> &CollectionNames {
        &self.names
    }

    /// Current initialisation phase.
    pub fn state(&self) -> InitState {
        self.cell().state.clone()
    }

    fn cell(&self) -> MutexGuard<'_, InitCell> {
        self.init.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, event: InitEvent) {
        let mut cell = self.cell();
        let finished = matches!(event, InitEvent::Succeeded | InitEvent::Failed(_));
        cell.state = cell.state.clone().on_event(event);
        if finished {
            cell.attempts += 1;
        }
    }

    /// Open the backend unless it is already ready.
    ///
    /// Safe to call concurrently: only one open runs at a time, and callers
    /// that waited on it return its outcome instead of opening again.
    pub async fn ensure_ready(&self) -> Result<(), StoreError> {
        let seen = {
            let cell = self.cell();
            if cell.state.is_ready() {
                return Ok(());
            }
            cell.attempts
        };

        let _init = self.init_lock.lock().await;
        {
            let cell = self.cell();
            if cell.state.is_ready() {
                return Ok(());
            }
            if cell.attempts != seen {
                if let InitState::Failed { reason } = &cell.state {
                    return Err(StoreError::Unavailable(reason.clone()));
                }
            }
        }

        self.transition(InitEvent::Started);
        tracing::debug!("Opening replicated store");
        match self.backend.open().await {
            Ok(()) => {
                self.transition(InitEvent::Succeeded);
                tracing::info!("Replicated store ready");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Replicated store failed to open");
                self.transition(InitEvent::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Close the backend. The next call reopens it.
    pub async fn close(&self) {
        let _init = self.init_lock.lock().await;
        self.backend.close().await;
        self.transition(InitEvent::Closed);
        tracing::debug!("Replicated store closed");
    }

    /// Run `op` against a ready backend, reopening and retrying once on
    /// `Unavailable`.
    async fn call<'f, T>(
        &self,
        op: impl Fn() -> BoxFuture<'f, Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        self.ensure_ready().await?;
        match op().await {
            Err(StoreError::Unavailable(reason)) => {
                tracing::debug!(%reason, "Replicated store lost, reopening");
                self.transition(InitEvent::Lost);
                self.ensure_ready().await?;
                op().await
            }
            result => result,
        }
    }

    // =========================================================================
    // Quarantine
    // =========================================================================

    /// Documents rejected by strict decoding, oldest first.
    pub fn quarantine(&self) -> Vec<QuarantinedDocument> {
        self.quarantine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn quarantine_document(&self, collection: &str, id: String, reason: String) {
        let mut log = self.quarantine.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = log
            .iter()
            .position(|q| q.collection == collection && q.id == id)
        {
            // Seen on an earlier pass; refresh without logging again.
            log.remove(pos);
        } else {
            tracing::warn!(collection, id = %id, %reason, "Quarantined malformed document");
        }
        if log.len() >= QUARANTINE_LIMIT {
            log.pop_front();
        }
        log.push_back(QuarantinedDocument {
            collection: collection.to_string(),
            id,
            reason,
        });
    }

    fn decode<T>(
        &self,
        collection: &str,
        value: Value,
        decode: fn(Value) -> Result<T, TypesError>,
    ) -> Option<T> {
        let id = document_id(&value);
        match decode(value) {
            Ok(decoded) => Some(decoded),
            Err(TypesError::Malformed { reason, .. }) => {
                self.quarantine_document(collection, id, reason);
                None
            }
            Err(e) => {
                self.quarantine_document(collection, id, e.to_string());
                None
            }
        }
    }

    // =========================================================================
    // Chats
    // =========================================================================

    /// Upsert a chat document.
    pub async fn put_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let doc = serde_json::to_value(ChatDocument::from_chat(chat, now_millis()))?;
        let collection = self.names.chats.as_str();
        let id = chat.id.as_str();
        self.call(|| self.backend.put(collection, id, doc.clone()))
            .await?;
        tracing::debug!(chat_id = %chat.id, "Stored chat");
        Ok(())
    }

    /// Fetch one chat.
    pub async fn get_chat(&self, id: &ChatId) -> Result<Option<Chat>, StoreError> {
        let collection = self.names.chats.as_str();
        let raw = self
            .call(|| self.backend.get(collection, id.as_str()))
            .await?;
        Ok(raw.and_then(|value| self.decode(collection, value, ChatDocument::decode)))
    }

    /// Every well-formed chat in the store, in store order.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        let collection = self.names.chats.as_str();
        let raw = self.call(|| self.backend.list(collection)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| self.decode(collection, value, ChatDocument::decode))
            .collect())
    }

    /// Delete a chat and every message document that belongs to it.
    ///
    /// Returns the number of messages removed. Messages go first, so a
    /// failure part way leaves the chat document in place.
    pub async fn delete_chat(&self, id: &ChatId) -> Result<usize, StoreError> {
        let messages = self.names.messages.as_str();
        let raw = self.call(|| self.backend.list(messages)).await?;
        let owned: Vec<String> = raw
            .iter()
            .filter(|value| value.get("chatId").and_then(Value::as_str) == Some(id.as_str()))
            .map(document_id)
            .collect();

        let mut removed = 0;
        for message_id in &owned {
            if self
                .call(|| self.backend.delete(messages, message_id.as_str()))
                .await?
            {
                removed += 1;
            }
        }

        let chats = self.names.chats.as_str();
        self.call(|| self.backend.delete(chats, id.as_str())).await?;
        tracing::debug!(chat_id = %id, removed, "Deleted chat");
        Ok(removed)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Upsert a message document.
    pub async fn put_message(&self, message: &Message) -> Result<(), StoreError> {
        let doc = serde_json::to_value(MessageDocument::from_message(message, now_millis()))?;
        let collection = self.names.messages.as_str();
        let id = message.id.as_str();
        self.call(|| self.backend.put(collection, id, doc.clone()))
            .await?;
        tracing::debug!(message_id = %message.id, chat_id = %message.chat_id, "Stored message");
        Ok(())
    }

    /// Fetch one message.
    pub async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let collection = self.names.messages.as_str();
        let raw = self
            .call(|| self.backend.get(collection, id.as_str()))
            .await?;
        Ok(raw.and_then(|value| self.decode(collection, value, MessageDocument::decode)))
    }

    /// Every well-formed message in the store, in store order.
    pub async fn list_messages(&self) -> Result<Vec<Message>, StoreError> {
        let collection = self.names.messages.as_str();
        let raw = self.call(|| self.backend.list(collection)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| self.decode(collection, value, MessageDocument::decode))
            .collect())
    }

    /// Messages of one chat in display order.
    pub async fn messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        let mut messages: Vec<Message> = self
            .list_messages()
            .await?
            .into_iter()
            .filter(|m| &m.chat_id == chat_id)
            .collect();
        messages.sort_by(Message::display_order);
        Ok(messages)
    }

    /// Delete a message document. Returns whether it existed.
    pub async fn delete_message(&self, id: &MessageId) -> Result<bool, StoreError> {
        let collection = self.names.messages.as_str();
        self.call(|| self.backend.delete(collection, id.as_str()))
            .await
    }
}
