//! # board-types
//!
//! Data model for meshboard, a wallet-addressed feed and messaging client
//! that keeps a local optimistic view in step with a replicated document
//! store and a content-addressed blob store.
//!
//! This crate provides the types shared by all meshboard crates:
//! - [`Address`], [`ChatId`], [`MessageId`], [`ContentId`] - Identity types
//! - [`Chat`], [`Message`], [`MediaItem`] - Messaging entities
//! - [`Post`], [`Comment`], [`Visibility`] - Feed entities
//! - [`ChatDocument`], [`MessageDocument`] - Replicated wire documents
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chat;
mod error;
mod ids;
mod post;
mod wire;

pub use chat::{Chat, EditRecord, LastMessage, MediaItem, Message};
pub use error::TypesError;
pub use ids::{now_millis, Address, ChatId, ContentId, MessageId};
pub use post::{Comment, Post, PostDocument, PostMedia, PostSummary, Visibility};
pub use wire::{document_id, ChatDocument, MessageDocument};
