//! Feed entities: posts and comments.

use serde::{Deserialize, Serialize};

use crate::ids::{now_millis, Address, ContentId};

/// Who may see a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Visibility {
    /// Everyone; also announced to the discovery index.
    Public,
    /// The author's followers.
    Followers,
    /// Only the listed addresses.
    Private {
        /// Addresses allowed to read the post.
        #[serde(default)]
        allowed: Vec<Address>,
    },
}

impl Visibility {
    /// Whether the post should be announced to the discovery index.
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Media attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMedia {
    /// Identifier of the uploaded blob.
    #[serde(rename = "contentCID")]
    pub content_cid: ContentId,
    /// Declared type, e.g. `image/png`.
    #[serde(rename = "type")]
    pub media_type: String,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment id (UUID v4).
    pub id: String,
    /// Post this comment belongs to.
    pub post_id: String,
    /// Author address.
    pub author_address: Address,
    /// Comment text.
    pub content: String,
    /// Creation time in milliseconds.
    pub timestamp: u64,
}

impl Comment {
    /// Write a new comment stamped with the current time.
    pub fn compose(post_id: &str, author: Address, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author_address: author,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// A feed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// The canonical copy's content identifier when one exists, otherwise a UUID.
    pub id: String,
    /// Author address.
    pub author_address: Address,
    /// Post text.
    pub content: String,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    /// Audience.
    pub visibility: Visibility,
    /// Identifier of the canonical JSON copy in the content store.
    #[serde(rename = "contentCID", default, skip_serializing_if = "Option::is_none")]
    pub content_cid: Option<ContentId>,
    /// Attached media.
    #[serde(default)]
    pub media_items: Vec<PostMedia>,
    /// Like counter.
    #[serde(default)]
    pub likes: u32,
    /// Comments, oldest first.
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    /// Whether `viewer` may see this post.
    ///
    /// `follows_author` is supplied by the caller's social graph.
    pub fn is_visible_to(&self, viewer: Option<&Address>, follows_author: bool) -> bool {
        if viewer == Some(&self.author_address) {
            return true;
        }
        match &self.visibility {
            Visibility::Public => true,
            Visibility::Followers => viewer.is_some() && follows_author,
            Visibility::Private { allowed } => viewer.map(|v| allowed.contains(v)).unwrap_or(false),
        }
    }

    /// Rebuild a post from a discovery-index summary.
    pub fn from_summary(summary: PostSummary) -> Self {
        Self {
            id: summary.id,
            author_address: summary.author_address,
            content: summary.content,
            timestamp: summary.timestamp,
            visibility: Visibility::Public,
            content_cid: summary.content_cid,
            media_items: summary.media_items,
            likes: 0,
            comments: Vec::new(),
        }
    }
}

/// Canonical copy of a post stored in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDocument {
    /// Format version.
    pub version: u32,
    /// Post text.
    pub content: String,
    /// Author address.
    pub author_address: Address,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    /// Audience.
    pub visibility: Visibility,
    /// Attached media.
    #[serde(default)]
    pub media_items: Vec<PostMedia>,
}

impl PostDocument {
    /// Current format version.
    pub const VERSION: u32 = 1;
}

/// Post summary registered with, and paged from, the discovery index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    /// Post id.
    pub id: String,
    /// Post text.
    pub content: String,
    /// Author address.
    pub author_address: Address,
    /// Creation time in milliseconds.
    pub timestamp: u64,
    /// Canonical copy identifier.
    #[serde(rename = "contentCID", default, skip_serializing_if = "Option::is_none")]
    pub content_cid: Option<ContentId>,
    /// Attached media.
    #[serde(default)]
    pub media_items: Vec<PostMedia>,
}

impl PostSummary {
    /// Summarise a post for the discovery index.
    pub fn of(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            content: post.content.clone(),
            author_address: post.author_address.clone(),
            timestamp: post.timestamp,
            content_cid: post.content_cid.clone(),
            media_items: post.media_items.clone(),
        }
    }
}
