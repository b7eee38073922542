//! # board-client
//!
//! Client library for meshboard: peer-replicated chats and a content-addressed
//! post feed.
//!
//! ## Features
//!
//! - **Optimistic local state**: sends, edits and deletes apply locally first
//! - **Full reconciliation**: periodic bidirectional diff against the
//!   replicated store; a failed write is retried by the next pass
//! - **Lazy store initialisation**: concurrent callers share one open
//! - **Strict decoding**: malformed remote documents are quarantined
//! - **Feed**: posts stored as canonical JSON, pinned, announced to a
//!   discovery index
//!
//! ## Example
//!
//! ```ignore
//! use meshboard_client::{MemoryBackend, ReplicatedStore, SyncEngine};
//!
//! let store = Arc::new(ReplicatedStore::new(Arc::new(MemoryBackend::new())));
//! let engine = SyncEngine::new(store, me);
//!
//! let chat = engine.get_or_create_chat(&peer).await;
//! engine.send_message(&chat.id, Some("hi".into()), vec![]).await?;
//! let report = engine.sync().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod feed;
pub mod store;

pub use client::{content_store, BoardClient, ClientError, Services};
pub use config::{
    Config, ConfigError, ContentConfig, DiscoveryConfig, GatewayConfig, IdentityConfig,
    ReplicationConfig, SyncConfig, DEFAULT_CONFIG_FILE,
};
pub use discovery::{DiscoveryError, DiscoveryIndex, HttpDiscovery, MockDiscovery};
pub use engine::{spawn_sync_task, EngineError, SyncEngine, SyncReport};
pub use feed::{spawn_feed_poller, FeedService, FeedServiceError, MediaUpload, PostDraft};
pub use store::{
    Backend, CollectionNames, HttpBackend, MemoryBackend, QuarantinedDocument, ReplicatedStore,
    StoreError, QUARANTINE_LIMIT,
};
