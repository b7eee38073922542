//! # board-core
//!
//! Pure logic for meshboard (no I/O, instant tests).
//!
//! This crate holds the local optimistic view of chats, messages and posts
//! and the algorithms that reconcile it with replicated state, without any
//! network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure**: they take input and produce output
//! without side effects. The actual I/O (replicated store, content node,
//! gateways) is performed by `board-client` and `board-gateway`, which feed
//! the results through these functions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod feed;
pub mod init;
pub mod reconcile;
pub mod sniff;
pub mod state;

pub use feed::{Feed, FeedError};
pub use init::{InitEvent, InitState};
pub use reconcile::{diff_messages, plan_chats, ChatPlan, MessageDiff};
pub use sniff::{classify, sniff, MediaKind, Sniffed, OCTET_STREAM, TEXT_PLAIN_UTF8};
pub use state::{LocalState, MergeOutcome, StateError};
