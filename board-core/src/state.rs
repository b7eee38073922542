//! Local optimistic state.
//!
//! Everything the user sees comes from here. User actions mutate it
//! immediately; sync passes merge remote data into it. All mutation goes
//! through `&mut self`, so callers serialise access (the engine wraps it in a
//! mutex held only across these synchronous calls, never across I/O).

use std::collections::{BTreeMap, HashSet};

use board_types::{Address, Chat, ChatId, Message, MessageId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from local state mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No chat with this id exists locally.
    #[error("unknown chat: {0}")]
    UnknownChat(ChatId),

    /// No message with this id exists in the chat.
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),

    /// Only the sender may change a message.
    #[error("message {0} was not sent by the local user")]
    NotAuthor(MessageId),

    /// A message needs text or media.
    #[error("message has neither content nor media")]
    EmptyMessage,

    /// The chat does not include the local user.
    #[error("local user is not a participant of chat {0}")]
    NotParticipant(ChatId),
}

/// Result of merging remote messages into one chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Messages that were new locally.
    pub added: usize,
    /// Local messages replaced by a copy with more edits.
    pub updated: usize,
    /// Amount added to the chat's unread counter.
    pub unread_added: u32,
}

/// The local user's view of their chats and messages.
///
/// Serialisable as a whole so that it can be snapshotted to disk and
/// restored on the next start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    me: Address,
    chats: BTreeMap<ChatId, Chat>,
    messages: BTreeMap<ChatId, Vec<Message>>,
    selected: Option<ChatId>,
}

impl LocalState {
    /// Empty state for `me`.
    pub fn new(me: Address) -> Self {
        Self {
            me,
            chats: BTreeMap::new(),
            messages: BTreeMap::new(),
            selected: None,
        }
    }

    /// The local user's address.
    pub fn me(&self) -> &Address {
        &self.me
    }

    // -------------------------------------------------------------------------
    // Chats
    // -------------------------------------------------------------------------

    /// Return the chat with `peer`, creating it locally on first contact.
    pub fn get_or_create_chat(&mut self, peer: &Address) -> &Chat {
        let me = self.me.clone();
        let id = ChatId::for_pair(&me, peer);
        self.chats
            .entry(id)
            .or_insert_with(|| Chat::between(me, peer.clone()))
    }

    /// Look up a chat.
    pub fn chat(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.get(id)
    }

    /// All chats, in id order.
    pub fn chats(&self) -> impl Iterator<Item = &Chat> {
        self.chats.values()
    }

    /// Ids of all local chats.
    pub fn chat_ids(&self) -> Vec<ChatId> {
        self.chats.keys().cloned().collect()
    }

    /// Chats ordered for display: most recent activity first, silent chats last.
    pub fn chat_list(&self) -> Vec<&Chat> {
        let mut list: Vec<&Chat> = self.chats.values().collect();
        list.sort_by(|a, b| {
            let ta = a.last_message.as_ref().map(|m| m.timestamp);
            let tb = b.last_message.as_ref().map(|m| m.timestamp);
            tb.cmp(&ta).then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// Add a chat pulled from the replicated store.
    ///
    /// Returns `Ok(false)` if the chat already exists locally.
    pub fn insert_remote_chat(&mut self, mut chat: Chat) -> Result<bool, StateError> {
        if !chat.includes(&self.me) {
            return Err(StateError::NotParticipant(chat.id));
        }
        if self.chats.contains_key(&chat.id) {
            return Ok(false);
        }
        chat.unread_count = 0;
        self.chats.insert(chat.id.clone(), chat);
        Ok(true)
    }

    /// Remove a chat and all of its messages.
    pub fn remove_chat(&mut self, id: &ChatId) -> Result<(Chat, Vec<Message>), StateError> {
        let chat = self
            .chats
            .remove(id)
            .ok_or_else(|| StateError::UnknownChat(id.clone()))?;
        let messages = self.messages.remove(id).unwrap_or_default();
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Ok((chat, messages))
    }

    /// The currently open chat.
    pub fn selected(&self) -> Option<&ChatId> {
        self.selected.as_ref()
    }

    /// Open a chat (or close the open one with `None`).
    ///
    /// Opening a chat marks it read. Returns the unread count that was cleared.
    pub fn select(&mut self, id: Option<ChatId>) -> Result<u32, StateError> {
        match id {
            None => {
                self.selected = None;
                Ok(0)
            }
            Some(id) => {
                let cleared = self.mark_read(&id)?;
                self.selected = Some(id);
                Ok(cleared)
            }
        }
    }

    /// Reset a chat's unread counter and mark received messages read.
    ///
    /// Returns the unread count before the reset.
    pub fn mark_read(&mut self, id: &ChatId) -> Result<u32, StateError> {
        let chat = self
            .chats
            .get_mut(id)
            .ok_or_else(|| StateError::UnknownChat(id.clone()))?;
        let cleared = std::mem::take(&mut chat.unread_count);
        if let Some(list) = self.messages.get_mut(id) {
            for message in list.iter_mut().filter(|m| m.sender_address != self.me) {
                message.read = true;
            }
        }
        Ok(cleared)
    }

    /// Sum of unread counters across chats.
    pub fn total_unread(&self) -> u32 {
        self.chats
            .values()
            .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    /// Messages of a chat in display order.
    pub fn messages(&self, chat_id: &ChatId) -> &[Message] {
        self.messages.get(chat_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up one message.
    pub fn message(&self, chat_id: &ChatId, id: &MessageId) -> Option<&Message> {
        self.messages(chat_id).iter().find(|m| &m.id == id)
    }

    /// Append a locally composed message (optimistic send).
    ///
    /// Re-appending an id that is already present is a no-op.
    pub fn append_local(&mut self, message: Message) -> Result<(), StateError> {
        if !message.has_body() {
            return Err(StateError::EmptyMessage);
        }
        let chat = self
            .chats
            .get_mut(&message.chat_id)
            .ok_or_else(|| StateError::UnknownChat(message.chat_id.clone()))?;
        let list = self.messages.entry(message.chat_id.clone()).or_default();
        if list.iter().any(|m| m.id == message.id) {
            return Ok(());
        }
        list.push(message);
        list.sort_by(Message::display_order);
        chat.last_message = list.last().map(Message::preview);
        Ok(())
    }

    /// Merge remote messages into a chat.
    ///
    /// `incoming` are messages whose ids are new locally; `superseding` are
    /// remote copies with a longer edit history than the local copy (see
    /// [`crate::diff_messages`]). The list is re-sorted rather than appended
    /// to, since remote messages arrive in no particular order. Messages from
    /// other senders bump the unread counter unless the chat is open; the
    /// counter never decreases here.
    pub fn merge(
        &mut self,
        chat_id: &ChatId,
        incoming: Vec<Message>,
        superseding: Vec<Message>,
    ) -> Result<MergeOutcome, StateError> {
        let is_open = self.selected.as_ref() == Some(chat_id);
        let chat = self
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StateError::UnknownChat(chat_id.clone()))?;
        let list = self.messages.entry(chat_id.clone()).or_default();

        let mut outcome = MergeOutcome::default();
        let mut known: HashSet<MessageId> = list.iter().map(|m| m.id.clone()).collect();
        for mut message in incoming {
            if &message.chat_id != chat_id || !known.insert(message.id.clone()) {
                continue;
            }
            let from_peer = message.sender_address != self.me;
            message.read = !from_peer || is_open;
            if from_peer && !is_open {
                outcome.unread_added = outcome.unread_added.saturating_add(1);
            }
            list.push(message);
            outcome.added += 1;
        }

        for remote in superseding {
            if let Some(local) = list.iter_mut().find(|m| m.id == remote.id) {
                if remote.supersedes(local) {
                    local.content = remote.content;
                    local.media_items = remote.media_items;
                    local.is_edited = remote.is_edited;
                    local.edit_history = remote.edit_history;
                    outcome.updated += 1;
                }
            }
        }

        if outcome.added > 0 {
            list.sort_by(Message::display_order);
        }
        if outcome.added > 0 || outcome.updated > 0 {
            chat.last_message = list.last().map(Message::preview);
        }
        chat.unread_count = chat.unread_count.saturating_add(outcome.unread_added);
        Ok(outcome)
    }

    /// Edit one of the local user's messages, returning the updated copy.
    pub fn edit(
        &mut self,
        chat_id: &ChatId,
        id: &MessageId,
        content: Option<String>,
        at: u64,
    ) -> Result<Message, StateError> {
        let chat = self
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StateError::UnknownChat(chat_id.clone()))?;
        let list = self
            .messages
            .get_mut(chat_id)
            .ok_or_else(|| StateError::UnknownMessage(id.clone()))?;
        let position = list
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| StateError::UnknownMessage(id.clone()))?;

        let message = &mut list[position];
        if message.sender_address != self.me {
            return Err(StateError::NotAuthor(id.clone()));
        }
        let has_text = content.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false);
        if !has_text && message.media_items.is_empty() {
            return Err(StateError::EmptyMessage);
        }
        message.edit(content, at);
        let edited = message.clone();

        if position + 1 == list.len() {
            chat.last_message = Some(edited.preview());
        }
        Ok(edited)
    }

    /// Remove one of the local user's messages, returning it.
    pub fn remove(&mut self, chat_id: &ChatId, id: &MessageId) -> Result<Message, StateError> {
        let chat = self
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StateError::UnknownChat(chat_id.clone()))?;
        let list = self
            .messages
            .get_mut(chat_id)
            .ok_or_else(|| StateError::UnknownMessage(id.clone()))?;
        let position = list
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| StateError::UnknownMessage(id.clone()))?;
        if list[position].sender_address != self.me {
            return Err(StateError::NotAuthor(id.clone()));
        }

        let removed = list.remove(position);
        chat.last_message = list.last().map(Message::preview);
        Ok(removed)
    }
}
