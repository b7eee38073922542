//! Replicated document formats.
//!
//! These are the shapes written to and read from the replicated document
//! store. Decoding is strict: a document that parses but violates the chat
//! or message invariants is rejected with [`TypesError::Malformed`] instead
//! of being merged into local state.
//!
//! Local-only fields (`unreadCount`, receiver-side `read`) never appear here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{Chat, EditRecord, LastMessage, MediaItem, Message};
use crate::error::TypesError;
use crate::ids::{Address, ChatId, MessageId};

/// Chat document as stored in the `chats` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    /// Store key, mirrors `id`.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Chat id.
    pub id: String,
    /// Participant addresses.
    pub participants: Vec<String>,
    /// Cached preview.
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    /// When this copy was written to the store.
    #[serde(default)]
    pub updated_at: u64,
}

impl ChatDocument {
    /// Build the wire form of a chat.
    pub fn from_chat(chat: &Chat, updated_at: u64) -> Self {
        Self {
            doc_id: Some(chat.id.to_string()),
            id: chat.id.to_string(),
            participants: chat.participants.iter().map(|p| p.to_string()).collect(),
            last_message: chat.last_message.clone(),
            updated_at,
        }
    }

    /// Validate and convert into a local chat with a zero unread count.
    pub fn into_chat(self) -> Result<Chat, TypesError> {
        let malformed = |reason: &str| TypesError::Malformed {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.participants.len() != 2 {
            return Err(malformed("chat must have exactly two participants"));
        }
        let a = Address::parse(&self.participants[0])
            .map_err(|_| malformed("invalid participant address"))?;
        let b = Address::parse(&self.participants[1])
            .map_err(|_| malformed("invalid participant address"))?;

        let mut chat = Chat::between(a, b);
        if chat.id.as_str() != self.id {
            return Err(malformed("chat id does not match participants"));
        }
        chat.last_message = self.last_message;
        Ok(chat)
    }

    /// Decode a raw store document.
    pub fn decode(value: Value) -> Result<Chat, TypesError> {
        let id = document_id(&value);
        let doc: ChatDocument =
            serde_json::from_value(value).map_err(|e| TypesError::Malformed {
                id,
                reason: e.to_string(),
            })?;
        doc.into_chat()
    }
}

/// Message document as stored in the `messages` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    /// Store key, mirrors `id`.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Message id.
    pub id: String,
    /// Owning chat.
    pub chat_id: String,
    /// Author address.
    pub sender_address: String,
    /// Text body.
    #[serde(default)]
    pub content: Option<String>,
    /// Attached media.
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    /// Sender clock.
    pub timestamp: u64,
    /// Edited flag.
    #[serde(default)]
    pub is_edited: bool,
    /// Prior versions.
    #[serde(default)]
    pub edit_history: Vec<EditRecord>,
    /// When this copy was written to the store.
    #[serde(default)]
    pub saved_at: u64,
}

impl MessageDocument {
    /// Build the wire form of a message.
    pub fn from_message(message: &Message, saved_at: u64) -> Self {
        Self {
            doc_id: Some(message.id.to_string()),
            id: message.id.to_string(),
            chat_id: message.chat_id.to_string(),
            sender_address: message.sender_address.to_string(),
            content: message.content.clone(),
            media_items: message.media_items.clone(),
            timestamp: message.timestamp,
            is_edited: message.is_edited,
            edit_history: message.edit_history.clone(),
            saved_at,
        }
    }

    /// Validate and convert into a local, unread message.
    pub fn into_message(self) -> Result<Message, TypesError> {
        let malformed = |reason: &str| TypesError::Malformed {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(malformed("message id is empty"));
        }
        if self.chat_id.trim().is_empty() {
            return Err(malformed("chat id is empty"));
        }
        let sender =
            Address::parse(&self.sender_address).map_err(|_| malformed("invalid sender address"))?;

        let message = Message {
            id: MessageId::from_raw(self.id.clone()),
            chat_id: ChatId::from_raw(self.chat_id.clone()),
            sender_address: sender,
            content: self.content,
            media_items: self.media_items,
            timestamp: self.timestamp,
            read: false,
            is_edited: self.is_edited,
            edit_history: self.edit_history,
        };
        if !message.has_body() {
            return Err(malformed("message has neither content nor media"));
        }
        Ok(message)
    }

    /// Decode a raw store document.
    pub fn decode(value: Value) -> Result<Message, TypesError> {
        let id = document_id(&value);
        let doc: MessageDocument =
            serde_json::from_value(value).map_err(|e| TypesError::Malformed {
                id,
                reason: e.to_string(),
            })?;
        doc.into_message()
    }
}

/// Best-effort id of a raw document, for error reporting.
pub fn document_id(value: &Value) -> String {
    value
        .get("id")
        .or_else(|| value.get("_id"))
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
