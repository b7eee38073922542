//! Replicated chat commands.

use anyhow::{Context as _, Result};
use board_client::{BoardClient, SyncReport};
use board_types::{Address, Chat, ChatId, ContentId, MediaItem, Message, MessageId};

use super::{format_timestamp, short, Context};

/// Send a message, then run a pass so it reaches the store.
///
/// An unreachable store is not an error: the message is kept locally and
/// pushed by a later `chat sync`.
pub async fn send(
    ctx: &Context,
    peer: &str,
    message: Option<String>,
    media: &[String],
) -> Result<()> {
    if message.is_none() && media.is_empty() {
        anyhow::bail!("Nothing to send: give a message or --media <cid>");
    }
    let peer = Address::parse(peer).context("Invalid peer address")?;
    let media = media
        .iter()
        .map(|raw| ContentId::parse(raw).map(|cid| MediaItem::new(cid, None)))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid media identifier")?;

    let client = ctx.client().await?;
    let engine = client.engine();
    let chat = engine.get_or_create_chat(&peer).await;
    let sent = engine.send_message(&chat.id, message, media).await?;

    match engine.sync().await {
        Ok(report) => {
            println!("Sent {} to {}", sent.id, peer);
            print_report(&report);
        }
        Err(e) => {
            tracing::warn!(message_id = %sent.id, error = %e, "Sync after send failed");
            println!("Queued {} for {}; run 'meshboard chat sync' when online", sent.id, peer);
        }
    }

    finish(ctx, &client).await
}

/// List chats, most recent first.
pub async fn list(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    let me = client.engine().me().clone();
    let chats = client.engine().chat_list().await;

    if chats.is_empty() {
        println!("No chats yet.");
        return Ok(());
    }
    for chat in &chats {
        println!("{}", chat_line(chat, &me));
    }
    println!();
    println!("{} unread", client.engine().total_unread().await);
    Ok(())
}

/// Print the chat with `peer` and mark it read.
pub async fn show(ctx: &Context, peer: &str) -> Result<()> {
    let peer = Address::parse(peer).context("Invalid peer address")?;
    let client = ctx.client().await?;
    let chat_id = existing_chat(&client, &peer).await?;

    let cleared = client.engine().select_chat(Some(chat_id.clone())).await?;
    let messages = client.engine().messages(&chat_id).await;

    println!("=== {} ===", peer);
    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in &messages {
        println!("{}", message_line(message));
    }
    if cleared > 0 {
        println!();
        println!("Marked {} read", cleared);
    }

    finish(ctx, &client).await
}

/// Replace the text of one of the local user's messages.
pub async fn edit(ctx: &Context, peer: &str, message_id: &str, text: String) -> Result<()> {
    let peer = Address::parse(peer).context("Invalid peer address")?;
    let client = ctx.client().await?;
    let chat_id = existing_chat(&client, &peer).await?;

    let edited = client
        .engine()
        .edit_message(&chat_id, &MessageId::from_raw(message_id), Some(text))
        .await
        .context("Cannot edit message")?;
    println!("Edited {} ({} prior versions)", edited.id, edited.edit_history.len());

    finish(ctx, &client).await
}

/// Delete one of the local user's messages.
pub async fn delete(ctx: &Context, peer: &str, message_id: &str) -> Result<()> {
    let peer = Address::parse(peer).context("Invalid peer address")?;
    let client = ctx.client().await?;
    let chat_id = existing_chat(&client, &peer).await?;

    let removed = client
        .engine()
        .delete_message(&chat_id, &MessageId::from_raw(message_id))
        .await
        .context("Cannot delete message")?;
    println!("Deleted {}", removed.id);

    finish(ctx, &client).await
}

/// Run one reconciliation pass and print its counters.
pub async fn sync(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    let report = client
        .engine()
        .sync()
        .await
        .context("Sync pass failed; local state is unchanged")?;

    print_report(&report);
    finish(ctx, &client).await
}

async fn existing_chat(client: &BoardClient, peer: &Address) -> Result<ChatId> {
    let chat_id = ChatId::for_pair(client.engine().me(), peer);
    let known = client
        .engine()
        .chat_list()
        .await
        .iter()
        .any(|chat| chat.id == chat_id);
    if !known {
        anyhow::bail!("No chat with {}", peer);
    }
    Ok(chat_id)
}

/// Save state and release the store.
async fn finish(ctx: &Context, client: &BoardClient) -> Result<()> {
    ctx.save(client).await?;
    client.engine().store().close().await;
    Ok(())
}

fn print_report(report: &SyncReport) {
    if !report.has_changes() && report.failures == 0 {
        println!("Up to date");
        return;
    }
    println!(
        "Chats:    {} imported, {} pushed, {} rejected",
        report.chats_imported, report.chats_pushed, report.chats_rejected
    );
    println!(
        "Messages: {} pulled, {} pushed, {} updated",
        report.messages_pulled, report.messages_pushed, report.messages_updated
    );
    if report.unread_added > 0 {
        println!("Unread:   +{}", report.unread_added);
    }
    if report.failures > 0 {
        println!("Failures: {} (retried next pass)", report.failures);
    }
}

fn chat_line(chat: &Chat, me: &Address) -> String {
    let unread = if chat.unread_count > 0 {
        format!(" [{} unread]", chat.unread_count)
    } else {
        String::new()
    };
    let preview = match &chat.last_message {
        Some(last) => format!(
            " {}: {} ({})",
            short(last.sender_address.as_str()),
            last.content.as_deref().unwrap_or("[media]"),
            format_timestamp(last.timestamp)
        ),
        None => String::new(),
    };
    format!("{}{}{}", chat.peer_of(me), unread, preview)
}

fn message_line(message: &Message) -> String {
    let mut line = format!(
        "[{}] {} {}: {}",
        format_timestamp(message.timestamp),
        message.id,
        short(message.sender_address.as_str()),
        message.content.as_deref().unwrap_or("")
    );
    for item in &message.media_items {
        line.push_str(&format!(" <{}>", item.cid));
    }
    if message.is_edited {
        line.push_str(" (edited)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::offline_context;
    use crate::session::{self, Session};
    use tempfile::tempdir;

    async fn logged_in(dir: &std::path::Path) -> Context {
        Session::new(Address::parse("0xa11ce").unwrap())
            .save(dir)
            .await
            .unwrap();
        offline_context(dir)
    }

    // ===========================================
    // Offline behaviour
    // ===========================================

    #[tokio::test]
    async fn send_offline_keeps_message_locally() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;

        send(&ctx, "0xB0B", Some("hi".into()), &[]).await.unwrap();

        let state = session::load_state(dir.path()).await.unwrap().unwrap();
        let chat_id = ChatId::for_pair(
            &Address::parse("0xa11ce").unwrap(),
            &Address::parse("0xb0b").unwrap(),
        );
        let messages = state.messages(&chat_id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn sync_offline_is_an_error() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;
        assert!(sync(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn send_requires_login() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        assert!(send(&ctx, "0xb0b", Some("hi".into()), &[]).await.is_err());
    }

    #[tokio::test]
    async fn send_requires_a_body() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;
        assert!(send(&ctx, "0xb0b", None, &[]).await.is_err());
        assert!(session::load_state(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn media_only_message_is_accepted() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;
        send(&ctx, "0xb0b", None, &["bafkreiexample".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn show_unknown_chat_fails() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;
        let err = show(&ctx, "0xb0b").await.unwrap_err();
        assert!(err.to_string().contains("No chat with"));
    }

    #[tokio::test]
    async fn edit_and_delete_own_message() {
        let dir = tempdir().unwrap();
        let ctx = logged_in(dir.path()).await;
        send(&ctx, "0xb0b", Some("helo".into()), &[]).await.unwrap();

        let state = session::load_state(dir.path()).await.unwrap().unwrap();
        let chat_id = state.chat_ids()[0].clone();
        let id = state.messages(&chat_id)[0].id.to_string();

        edit(&ctx, "0xb0b", &id, "hello".into()).await.unwrap();
        let state = session::load_state(dir.path()).await.unwrap().unwrap();
        assert!(state.messages(&chat_id)[0].is_edited);

        delete(&ctx, "0xb0b", &id).await.unwrap();
        let state = session::load_state(dir.path()).await.unwrap().unwrap();
        assert!(state.messages(&chat_id).is_empty());
    }

    // ===========================================
    // Rendering
    // ===========================================

    #[test]
    fn chat_line_shows_peer_unread_and_preview() {
        let me = Address::parse("0xa11ce").unwrap();
        let peer = Address::parse("0xb0b").unwrap();
        let mut chat = Chat::between(me.clone(), peer.clone());
        chat.unread_count = 2;
        let message = Message::compose(chat.id.clone(), peer, Some("yo".into()), vec![]);
        chat.last_message = Some(message.preview());

        let line = chat_line(&chat, &me);
        assert!(line.starts_with("0xb0b [2 unread]"));
        assert!(line.contains("0xb0b: yo"));
    }

    #[test]
    fn message_line_marks_edits_and_media() {
        let me = Address::parse("0xa11ce").unwrap();
        let chat_id = ChatId::for_pair(&me, &Address::parse("0xb0b").unwrap());
        let media = MediaItem::new(ContentId::parse("bafkreiexample").unwrap(), None);
        let mut message = Message::compose(chat_id, me, None, vec![media]);
        message.edit(Some("now with text".into()), message.timestamp + 1);

        let line = message_line(&message);
        assert!(line.contains("<bafkreiexample>"));
        assert!(line.ends_with("(edited)"));
        assert!(line.contains("now with text"));
    }
}
