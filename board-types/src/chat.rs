//! Chat and message entities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::ids::{now_millis, Address, ChatId, ContentId, MessageId};

/// A content-addressed media attachment, owned by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Identifier of the blob in the content store.
    pub cid: ContentId,
    /// Declared mime type, if the uploader knew it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl MediaItem {
    /// Create a media item with a declared mime type.
    pub fn new(cid: ContentId, mime_type: Option<String>) -> Self {
        Self {
            cid,
            mime_type,
            name: None,
            size: None,
        }
    }
}

/// A prior version of an edited message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    /// Content before the edit.
    pub content: Option<String>,
    /// When that content was written.
    pub timestamp: u64,
}

/// Denormalised preview of the latest message, for list rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    /// Message body, if any.
    pub content: Option<String>,
    /// Message timestamp.
    pub timestamp: u64,
    /// Who sent it.
    pub sender_address: Address,
}

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Derived from the sorted participant pair.
    pub id: ChatId,
    /// Exactly two addresses, sorted ascending. Both equal for a self-chat.
    pub participants: [Address; 2],
    /// Cached preview; derived, not authoritative.
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    /// Local perspective only, never replicated.
    #[serde(default)]
    pub unread_count: u32,
}

impl Chat {
    /// Create the chat between two addresses.
    pub fn between(a: Address, b: Address) -> Self {
        let id = ChatId::for_pair(&a, &b);
        let participants = if a <= b { [a, b] } else { [b, a] };
        Self {
            id,
            participants,
            last_message: None,
            unread_count: 0,
        }
    }

    /// Whether `address` is one of the two participants.
    pub fn includes(&self, address: &Address) -> bool {
        self.participants.iter().any(|p| p == address)
    }

    /// The other participant, from `me`'s point of view.
    ///
    /// For a self-chat this is `me`.
    pub fn peer_of(&self, me: &Address) -> &Address {
        if &self.participants[0] == me {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Globally unique, generated at send time.
    pub id: MessageId,
    /// The chat this message belongs to.
    pub chat_id: ChatId,
    /// Author of the message.
    pub sender_address: Address,
    /// Text body; absent for media-only messages.
    #[serde(default)]
    pub content: Option<String>,
    /// Attached media.
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    /// Sender's clock, authoritative for ordering.
    pub timestamp: u64,
    /// Receiver-side read flag.
    #[serde(default)]
    pub read: bool,
    /// Set once the message has been edited.
    #[serde(default)]
    pub is_edited: bool,
    /// Prior versions, oldest first.
    #[serde(default)]
    pub edit_history: Vec<EditRecord>,
}

impl Message {
    /// Compose a new outgoing message stamped with the current time.
    pub fn compose(
        chat_id: ChatId,
        sender: Address,
        content: Option<String>,
        media_items: Vec<MediaItem>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            chat_id,
            sender_address: sender,
            content,
            media_items,
            timestamp: now_millis(),
            read: true,
            is_edited: false,
            edit_history: Vec::new(),
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether there is anything to show: text or media.
    pub fn has_body(&self) -> bool {
        let has_text = self
            .content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        has_text || !self.media_items.is_empty()
    }

    /// Replace the content, keeping the prior version in the edit history.
    pub fn edit(&mut self, content: Option<String>, at: u64) {
        self.edit_history.push(EditRecord {
            content: self.content.take(),
            timestamp: at,
        });
        self.content = content;
        self.is_edited = true;
    }

    /// Whether this copy carries more edits than `other`.
    pub fn supersedes(&self, other: &Message) -> bool {
        self.edit_history.len() > other.edit_history.len()
    }

    /// Preview used for the chat list.
    pub fn preview(&self) -> LastMessage {
        LastMessage {
            content: self.content.clone(),
            timestamp: self.timestamp,
            sender_address: self.sender_address.clone(),
        }
    }

    /// Display order: timestamp ascending, ties broken by id.
    pub fn display_order(a: &Message, b: &Message) -> Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn chat_between_sorts_participants() {
        let chat = Chat::between(addr("0xbbb"), addr("0xaaa"));
        assert_eq!(chat.participants[0], addr("0xaaa"));
        assert_eq!(chat.participants[1], addr("0xbbb"));
        assert_eq!(chat.id, ChatId::for_pair(&addr("0xaaa"), &addr("0xbbb")));
    }

    #[test]
    fn chat_peer_of() {
        let me = addr("0xaaa");
        let chat = Chat::between(me.clone(), addr("0xbbb"));
        assert_eq!(chat.peer_of(&me), &addr("0xbbb"));

        let solo = Chat::between(me.clone(), me.clone());
        assert_eq!(solo.peer_of(&me), &me);
        assert!(solo.includes(&me));
    }

    #[test]
    fn edit_appends_history() {
        let chat = Chat::between(addr("0xa1"), addr("0xb1"));
        let mut msg = Message::compose(chat.id, addr("0xa1"), Some("hi".into()), vec![]).at(10);

        msg.edit(Some("hello".into()), 20);
        msg.edit(Some("hello!".into()), 30);

        assert!(msg.is_edited);
        assert_eq!(msg.content.as_deref(), Some("hello!"));
        assert_eq!(msg.edit_history.len(), 2);
        assert_eq!(msg.edit_history[0].content.as_deref(), Some("hi"));
        assert_eq!(msg.edit_history[1].content.as_deref(), Some("hello"));
        assert_eq!(msg.timestamp, 10);
    }

    #[test]
    fn display_order_breaks_ties_by_id() {
        let chat = ChatId::from_raw("c");
        let mut a = Message::compose(chat.clone(), addr("0xa1"), Some("a".into()), vec![]).at(5);
        let mut b = Message::compose(chat, addr("0xa1"), Some("b".into()), vec![]).at(5);
        a.id = MessageId::from_raw("1");
        b.id = MessageId::from_raw("2");

        assert_eq!(Message::display_order(&a, &b), Ordering::Less);
        assert_eq!(Message::display_order(&b, &a), Ordering::Greater);
    }

    #[test]
    fn media_only_message_has_body() {
        let cid = ContentId::parse("bafkreiabcdefgh").unwrap();
        let msg = Message::compose(
            ChatId::from_raw("c"),
            addr("0xa1"),
            None,
            vec![MediaItem::new(cid, Some("image/png".into()))],
        );
        assert!(msg.has_body());

        let empty = Message::compose(ChatId::from_raw("c"), addr("0xa1"), Some("  ".into()), vec![]);
        assert!(!empty.has_body());
    }
}
