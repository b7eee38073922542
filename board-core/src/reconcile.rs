//! Reconciliation planning.
//!
//! A sync pass is a full bidirectional diff between local optimistic state and
//! the replicated store. The functions here compute what must move in each
//! direction; applying the plan is left to [`crate::LocalState`] (inbound) and
//! the engine in `board-client` (outbound).

use std::collections::{HashMap, HashSet};

use board_types::{Address, Chat, ChatId, Message, MessageId};

/// What to do with chats after comparing local and remote ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPlan {
    /// Remote chats the local peer is party to and does not have yet.
    pub import: Vec<Chat>,
    /// Local chats missing from the store.
    pub push: Vec<ChatId>,
    /// Remote chats skipped by the participant filter.
    pub rejected: Vec<ChatId>,
}

/// Compare local chat ids with the remote chat list.
///
/// The participant filter keeps chats the local user is not party to out of
/// local state. It is not an access control boundary.
pub fn plan_chats<'a>(
    local: impl IntoIterator<Item = &'a ChatId>,
    remote: Vec<Chat>,
    me: &Address,
) -> ChatPlan {
    let local: HashSet<&ChatId> = local.into_iter().collect();
    let remote_ids: HashSet<ChatId> = remote.iter().map(|c| c.id.clone()).collect();

    let mut plan = ChatPlan::default();
    let mut seen = HashSet::new();
    for mut chat in remote {
        if local.contains(&chat.id) || !seen.insert(chat.id.clone()) {
            continue;
        }
        if chat.includes(me) {
            chat.unread_count = 0;
            plan.import.push(chat);
        } else {
            plan.rejected.push(chat.id);
        }
    }

    plan.push = local
        .into_iter()
        .filter(|id| !remote_ids.contains(*id))
        .cloned()
        .collect();
    plan.push.sort();
    plan
}

/// Message-level difference for one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDiff {
    /// Remote messages whose ids are absent locally.
    pub incoming: Vec<Message>,
    /// Remote copies carrying more edits than the local copy.
    pub superseding: Vec<Message>,
    /// Local messages absent remotely, or carrying more edits than the remote copy.
    pub outgoing: Vec<Message>,
}

impl MessageDiff {
    /// Whether local and remote already agree.
    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.superseding.is_empty() && self.outgoing.is_empty()
    }
}

/// Diff the local and remote message lists of one chat by id.
///
/// Duplicate ids in `remote` are collapsed to their first occurrence.
pub fn diff_messages(local: &[Message], remote: &[Message]) -> MessageDiff {
    let local_by_id: HashMap<&MessageId, &Message> = local.iter().map(|m| (&m.id, m)).collect();

    let mut diff = MessageDiff::default();
    let mut remote_by_id: HashMap<&MessageId, &Message> = HashMap::new();
    for message in remote {
        if remote_by_id.contains_key(&message.id) {
            continue;
        }
        remote_by_id.insert(&message.id, message);
        match local_by_id.get(&message.id) {
            None => diff.incoming.push(message.clone()),
            Some(local) if message.supersedes(local) => diff.superseding.push(message.clone()),
            Some(_) => {}
        }
    }

    diff.outgoing = local
        .iter()
        .filter(|m| match remote_by_id.get(&m.id) {
            None => true,
            Some(remote) => m.supersedes(remote),
        })
        .cloned()
        .collect();

    diff
}
