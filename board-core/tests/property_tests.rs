//! Property-based tests for reconciliation
//!
//! Uses proptest to verify the invariants of chat ids, merging and unread
//! accounting.

use std::collections::HashSet;

use meshboard_core::{diff_messages, LocalState};
use board_types::{Address, ChatId, Message, MessageId};
use proptest::prelude::*;

// ============================================================================
// Strategy Generators
// ============================================================================

/// Generate wallet-like addresses, mixed case
fn address_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("0x[0-9a-fA-F]{4,12}").expect("valid regex")
}

/// A remote message: (id, from_peer, timestamp)
fn remote_batch_strategy() -> impl Strategy<Value = Vec<(u8, bool, u64)>> {
    prop::collection::vec((0u8..40, any::<bool>(), 0u64..1_000), 0..40)
}

fn build(chat: &ChatId, me: &Address, peer: &Address, batch: &[(u8, bool, u64)]) -> Vec<Message> {
    batch
        .iter()
        .map(|(id, from_peer, ts)| {
            let sender = if *from_peer { peer.clone() } else { me.clone() };
            let mut m = Message::compose(chat.clone(), sender, Some(format!("m{id}")), vec![]).at(*ts);
            m.id = MessageId::from_raw(format!("m{id}"));
            m.read = false;
            m
        })
        .collect()
}

fn setup() -> (LocalState, ChatId, Address, Address) {
    let me = Address::parse("0xme").unwrap();
    let peer = Address::parse("0xpeer").unwrap();
    let mut state = LocalState::new(me.clone());
    let chat = state.get_or_create_chat(&peer).id.clone();
    (state, chat, me, peer)
}

fn merge_all(state: &mut LocalState, chat: &ChatId, remote: &[Message]) {
    let diff = diff_messages(state.messages(chat), remote);
    state.merge(chat, diff.incoming, diff.superseding).unwrap();
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// The chat id does not depend on argument order or address case
    #[test]
    fn chat_id_is_canonical(a in address_strategy(), b in address_strategy()) {
        let a1 = Address::parse(&a).unwrap();
        let b1 = Address::parse(&b).unwrap();
        let a2 = Address::parse(&a.to_uppercase().replace("0X", "0x")).unwrap();

        prop_assert_eq!(ChatId::for_pair(&a1, &b1), ChatId::for_pair(&b1, &a1));
        prop_assert_eq!(ChatId::for_pair(&a1, &b1), ChatId::for_pair(&b1, &a2));
    }

    /// After any sequence of merges the chat is sorted and free of duplicates
    #[test]
    fn merge_keeps_sorted_unique(batches in prop::collection::vec(remote_batch_strategy(), 1..5)) {
        let (mut state, chat, me, peer) = setup();

        for batch in &batches {
            let remote = build(&chat, &me, &peer, batch);
            merge_all(&mut state, &chat, &remote);
        }

        let list = state.messages(&chat);
        for pair in list.windows(2) {
            prop_assert!(
                (pair[0].timestamp, &pair[0].id) <= (pair[1].timestamp, &pair[1].id)
            );
        }
        let unique: HashSet<_> = list.iter().map(|m| &m.id).collect();
        prop_assert_eq!(unique.len(), list.len());
    }

    /// Unread only grows during sync, and only by peer messages
    #[test]
    fn unread_is_monotonic(batches in prop::collection::vec(remote_batch_strategy(), 1..5)) {
        let (mut state, chat, me, peer) = setup();
        let mut peer_ids = HashSet::new();

        for batch in &batches {
            let before = state.chat(&chat).unwrap().unread_count;
            let remote = build(&chat, &me, &peer, batch);
            let mut seen = HashSet::new();
            for m in &remote {
                if !seen.insert(m.id.clone()) {
                    continue;
                }
                if m.sender_address == peer && state.message(&chat, &m.id).is_none() {
                    peer_ids.insert(m.id.clone());
                }
            }
            merge_all(&mut state, &chat, &remote);
            prop_assert!(state.chat(&chat).unwrap().unread_count >= before);
        }

        prop_assert_eq!(state.chat(&chat).unwrap().unread_count as usize, peer_ids.len());
    }

    /// Merging the same remote set twice changes nothing the second time
    #[test]
    fn merge_is_idempotent(batch in remote_batch_strategy()) {
        let (mut state, chat, me, peer) = setup();
        let remote = build(&chat, &me, &peer, &batch);

        merge_all(&mut state, &chat, &remote);
        let after_first = state.clone();
        merge_all(&mut state, &chat, &remote);

        prop_assert_eq!(state, after_first);
    }

    /// An open chat never accumulates unread messages
    #[test]
    fn open_chat_stays_read(batch in remote_batch_strategy()) {
        let (mut state, chat, me, peer) = setup();
        state.select(Some(chat.clone())).unwrap();

        merge_all(&mut state, &chat, &build(&chat, &me, &peer, &batch));

        prop_assert_eq!(state.chat(&chat).unwrap().unread_count, 0);
    }
}
