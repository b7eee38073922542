//! Chat sync engine.
//!
//! [`SyncEngine`] owns the local optimistic state and keeps it converging
//! with the [`ReplicatedStore`]. User actions mutate local state first and
//! then write through to the store on a best-effort basis; a periodic full
//! reconciliation pass repairs whatever the write-through missed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use board_core::{diff_messages, plan_chats, LocalState, MessageDiff, StateError};
use board_types::{now_millis, Address, Chat, ChatId, MediaItem, Message, MessageId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::store::{ReplicatedStore, StoreError};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another pass is running; this one was skipped.
    #[error("sync pass already in progress")]
    SyncInProgress,

    /// The replicated store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The local operation was invalid.
    #[error(transparent)]
    State(#[from] StateError),

    /// A snapshot taken under another identity.
    #[error("snapshot belongs to {found}, engine runs as {expected}")]
    IdentityMismatch {
        /// Identity of this engine.
        expected: Address,
        /// Identity recorded in the snapshot.
        found: Address,
    },
}

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Remote chats added locally.
    pub chats_imported: usize,
    /// Local chats written to the store.
    pub chats_pushed: usize,
    /// Remote chats skipped by the participant filter.
    pub chats_rejected: usize,
    /// Remote messages added locally.
    pub messages_pulled: usize,
    /// Local messages written to the store.
    pub messages_pushed: usize,
    /// Local messages replaced by newer remote edits.
    pub messages_updated: usize,
    /// Increase in unread counters across chats.
    pub unread_added: u32,
    /// Writes or reads that failed and were left for the next pass.
    pub failures: usize,
}

impl SyncReport {
    /// Whether the pass moved anything in either direction.
    pub fn has_changes(&self) -> bool {
        self.chats_imported > 0
            || self.chats_pushed > 0
            || self.messages_pulled > 0
            || self.messages_pushed > 0
            || self.messages_updated > 0
    }
}

/// Clears the in-progress flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Local chat state plus reconciliation against the replicated store.
pub struct SyncEngine {
    me: Address,
    store: Arc<ReplicatedStore>,
    state: Mutex<LocalState>,
    in_progress: AtomicBool,
}

impl SyncEngine {
    /// Create an engine with empty local state.
    pub fn new(store: Arc<ReplicatedStore>, me: Address) -> Self {
        let state = LocalState::new(me.clone());
        Self {
            me,
            store,
            state: Mutex::new(state),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Create an engine from a saved snapshot.
    pub fn from_snapshot(store: Arc<ReplicatedStore>, snapshot: LocalState) -> Self {
        Self {
            me: snapshot.me().clone(),
            store,
            state: Mutex::new(snapshot),
            in_progress: AtomicBool::new(false),
        }
    }

    /// The local user.
    pub fn me(&self) -> &Address {
        &self.me
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<ReplicatedStore> {
        &self.store
    }

    /// Whether a pass is running.
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the local state, for persistence.
    pub async fn snapshot(&self) -> LocalState {
        self.state.lock().await.clone()
    }

    /// Replace local state with a snapshot taken by the same identity.
    pub async fn restore(&self, snapshot: LocalState) -> Result<(), EngineError> {
        if snapshot.me() != &self.me {
            return Err(EngineError::IdentityMismatch {
                expected: self.me.clone(),
                found: snapshot.me().clone(),
            });
        }
        *self.state.lock().await = snapshot;
        Ok(())
    }

    /// Chats for display, most recent first.
    pub async fn chat_list(&self) -> Vec<Chat> {
        let state = self.state.lock().await;
        state.chat_list().into_iter().cloned().collect()
    }

    /// Messages of one chat in display order.
    pub async fn messages(&self, chat_id: &ChatId) -> Vec<Message> {
        self.state.lock().await.messages(chat_id).to_vec()
    }

    /// Sum of unread counters.
    pub async fn total_unread(&self) -> u32 {
        self.state.lock().await.total_unread()
    }

    // =========================================================================
    // Chat operations
    // =========================================================================

    /// The chat with `peer`, created locally on first contact.
    ///
    /// A new chat is written to the store right away; if that fails the next
    /// pass pushes it.
    pub async fn get_or_create_chat(&self, peer: &Address) -> Chat {
        let (chat, created) = {
            let mut state = self.state.lock().await;
            let existed = state.chat(&ChatId::for_pair(&self.me, peer)).is_some();
            (state.get_or_create_chat(peer).clone(), !existed)
        };
        if created {
            tracing::debug!(chat_id = %chat.id, "Created chat");
            if let Err(e) = self.store.put_chat(&chat).await {
                tracing::warn!(chat_id = %chat.id, error = %e, "Chat not replicated yet");
            }
        }
        chat
    }

    /// Open a chat, or close the open one with `None`. Opening marks it read.
    pub async fn select_chat(&self, chat_id: Option<ChatId>) -> Result<u32, EngineError> {
        Ok(self.state.lock().await.select(chat_id)?)
    }

    /// Reset a chat's unread counter, then run an on-demand pass.
    ///
    /// Returns the count that was cleared.
    pub async fn mark_chat_read(&self, chat_id: &ChatId) -> Result<u32, EngineError> {
        let cleared = self.state.lock().await.mark_read(chat_id)?;
        match self.sync().await {
            Ok(report) => tracing::debug!(?report, "On-demand sync finished"),
            Err(EngineError::SyncInProgress) => {
                tracing::debug!("On-demand sync skipped, pass already running")
            }
            Err(e) => tracing::warn!(error = %e, "On-demand sync failed"),
        }
        Ok(cleared)
    }

    /// Delete a chat and its messages locally and in the store.
    ///
    /// If the remote delete fails the chat comes back on the next pull.
    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<(), EngineError> {
        let (_, messages) = self.state.lock().await.remove_chat(chat_id)?;
        match self.store.delete_chat(chat_id).await {
            Ok(removed) => {
                tracing::info!(chat_id = %chat_id, local = messages.len(), removed, "Deleted chat")
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Remote chat delete failed")
            }
        }
        Ok(())
    }

    // =========================================================================
    // Message operations
    // =========================================================================

    /// Send a message.
    ///
    /// The message is visible locally before this returns. Persistence is
    /// attempted once; on failure the message stays local-only until a pass
    /// pushes it.
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        content: Option<String>,
        media_items: Vec<MediaItem>,
    ) -> Result<Message, EngineError> {
        let (message, chat) = {
            let mut state = self.state.lock().await;
            let message = Message::compose(chat_id.clone(), self.me.clone(), content, media_items);
            state.append_local(message.clone())?;
            (message, state.chat(chat_id).cloned())
        };

        match self.store.put_message(&message).await {
            Ok(()) => {
                if let Some(chat) = chat {
                    if let Err(e) = self.store.put_chat(&chat).await {
                        tracing::debug!(chat_id = %chat.id, error = %e, "Chat preview not updated");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "Message kept local until next sync pass"
                );
            }
        }
        Ok(message)
    }

    /// Edit one of the local user's messages.
    ///
    /// A failed push is retried by the next pass, which sees the local copy
    /// carrying more edits than the remote one.
    pub async fn edit_message(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        content: Option<String>,
    ) -> Result<Message, EngineError> {
        let edited = self
            .state
            .lock()
            .await
            .edit(chat_id, message_id, content, now_millis())?;
        if let Err(e) = self.store.put_message(&edited).await {
            tracing::warn!(message_id = %message_id, error = %e, "Edit kept local until next sync pass");
        }
        Ok(edited)
    }

    /// Delete one of the local user's messages.
    ///
    /// Deletes are not retried. If the remote delete fails, or a peer still
    /// holds the message, it is pulled back in by a later pass.
    pub async fn delete_message(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
    ) -> Result<Message, EngineError> {
        let removed = self.state.lock().await.remove(chat_id, message_id)?;
        if let Err(e) = self.store.delete_message(message_id).await {
            tracing::warn!(message_id = %message_id, error = %e, "Remote message delete failed");
        }
        Ok(removed)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Run one full reconciliation pass.
    ///
    /// Fails with `SyncInProgress` if a pass is already running, and with a
    /// store error if chats cannot be listed. Later failures are counted in
    /// the report and left for the next pass.
    pub async fn sync(&self) -> Result<SyncReport, EngineError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::SyncInProgress);
        }
        let _guard = PassGuard(&self.in_progress);

        let mut report = SyncReport::default();
        self.sync_chats(&mut report).await?;
        self.sync_messages(&mut report).await;
        Ok(report)
    }

    async fn sync_chats(&self, report: &mut SyncReport) -> Result<(), EngineError> {
        let remote = self.store.list_chats().await?;

        let push = {
            let mut state = self.state.lock().await;
            let local = state.chat_ids();
            let plan = plan_chats(&local, remote, &self.me);

            for chat in plan.import {
                let chat_id = chat.id.clone();
                match state.insert_remote_chat(chat) {
                    Ok(true) => {
                        tracing::debug!(chat_id = %chat_id, "Imported chat");
                        report.chats_imported += 1;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(chat_id = %chat_id, error = %e, "Chat import refused"),
                }
            }
            for chat_id in &plan.rejected {
                tracing::debug!(chat_id = %chat_id, "Skipped chat without local participant");
            }
            report.chats_rejected = plan.rejected.len();

            plan.push
                .iter()
                .filter_map(|id| state.chat(id).cloned())
                .collect::<Vec<_>>()
        };

        for chat in push {
            match self.store.put_chat(&chat).await {
                Ok(()) => report.chats_pushed += 1,
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(chat_id = %chat.id, error = %e, "Failed to push chat");
                }
            }
        }
        Ok(())
    }

    async fn sync_messages(&self, report: &mut SyncReport) {
        let remote = match self.store.list_messages().await {
            Ok(remote) => remote,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(error = %e, "Failed to fetch messages");
                return;
            }
        };
        let mut by_chat: HashMap<ChatId, Vec<Message>> = HashMap::new();
        for message in remote {
            by_chat.entry(message.chat_id.clone()).or_default().push(message);
        }

        let outgoing = {
            let mut state = self.state.lock().await;
            let mut outgoing = Vec::new();
            for chat_id in state.chat_ids() {
                let remote = by_chat.remove(&chat_id).unwrap_or_default();
                let MessageDiff {
                    incoming,
                    superseding,
                    outgoing: local_only,
                } = diff_messages(state.messages(&chat_id), &remote);

                if !incoming.is_empty() || !superseding.is_empty() {
                    match state.merge(&chat_id, incoming, superseding) {
                        Ok(outcome) => {
                            report.messages_pulled += outcome.added;
                            report.messages_updated += outcome.updated;
                            report.unread_added = report.unread_added.saturating_add(outcome.unread_added);
                        }
                        Err(e) => {
                            report.failures += 1;
                            tracing::warn!(chat_id = %chat_id, error = %e, "Merge failed");
                        }
                    }
                }
                outgoing.extend(local_only);
            }
            outgoing
        };

        if !by_chat.is_empty() {
            tracing::debug!(chats = by_chat.len(), "Ignored messages of chats not held locally");
        }

        for message in outgoing {
            match self.store.put_message(&message).await {
                Ok(()) => report.messages_pushed += 1,
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(message_id = %message.id, error = %e, "Failed to push message");
                }
            }
        }
    }
}

/// Spawn the periodic sync task.
///
/// Ticks that fire while a pass is still running are skipped, not queued.
/// Returns a handle that can be used to abort the task.
pub fn spawn_sync_task(engine: Arc<SyncEngine>, config: SyncConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Sync task disabled");
            return;
        }

        tracing::info!("Sync task started (interval: {}s)", config.interval_secs);

        let mut timer = interval(config.interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            match engine.sync().await {
                Ok(report) if report.has_changes() => {
                    tracing::info!(
                        imported = report.chats_imported,
                        pulled = report.messages_pulled,
                        pushed = report.messages_pushed,
                        unread = report.unread_added,
                        "Sync pass finished"
                    );
                }
                Ok(report) => {
                    tracing::debug!(failures = report.failures, "Sync pass: nothing to do");
                }
                Err(EngineError::SyncInProgress) => {
                    tracing::debug!("Sync tick skipped, pass already running");
                }
                Err(e) => {
                    tracing::warn!("Sync pass failed: {}", e);
                }
            }
        }
    })
}
