//! Refresh and print the feed.

use anyhow::{Context as _, Result};
use board_types::{ContentId, Post, PostDocument};

use super::{format_timestamp, short, Context};

/// Pull recent posts from the discovery index and print the newest `limit`.
pub async fn run(ctx: &Context, limit: usize) -> Result<()> {
    if ctx.config().discovery.url.is_none() {
        println!("No discovery index configured; set [discovery] url in meshboard.toml");
        return Ok(());
    }

    let client = ctx.client().await?;
    let added = client
        .feed()
        .refresh()
        .await
        .context("Feed refresh failed")?;
    tracing::info!(added, "Feed refreshed");

    let posts = client.feed().posts().await;
    if posts.is_empty() {
        println!("No posts yet.");
        return Ok(());
    }
    for post in posts.iter().take(limit) {
        println!("{}", post_line(post));
    }
    Ok(())
}

/// Print the canonical copy of a post.
pub async fn show(ctx: &Context, raw: &str) -> Result<()> {
    let cid = ContentId::parse(raw).context("Invalid content identifier")?;
    let client = ctx.client().await?;
    let document = client
        .feed()
        .fetch_document(&cid)
        .await
        .with_context(|| format!("Cannot load post {}", cid))?;

    for line in document_lines(&document) {
        println!("{}", line);
    }
    Ok(())
}

fn post_line(post: &Post) -> String {
    let media = if post.media_items.is_empty() {
        String::new()
    } else {
        format!(" [{} media]", post.media_items.len())
    };
    format!(
        "{} {} ({}): {}{}",
        short(&post.id),
        short(post.author_address.as_str()),
        format_timestamp(post.timestamp),
        post.content,
        media
    )
}

fn document_lines(document: &PostDocument) -> Vec<String> {
    let mut lines = vec![
        format!("Author:     {}", document.author_address),
        format!("Posted:     {}", format_timestamp(document.timestamp)),
        format!("Visibility: {:?}", document.visibility),
        String::new(),
        document.content.clone(),
    ];
    for media in &document.media_items {
        lines.push(format!("  <{}> {}", media.content_cid, media.media_type));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::offline_context;
    use crate::session::Session;
    use board_types::{Address, PostMedia, PostSummary, Visibility};
    use tempfile::tempdir;

    #[tokio::test]
    async fn feed_without_index_is_not_an_error() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        run(&ctx, 10).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_index_fails() {
        let dir = tempdir().unwrap();
        Session::new(Address::parse("0xa11ce").unwrap())
            .save(dir.path())
            .await
            .unwrap();
        let mut ctx = offline_context(dir.path());
        ctx.config.discovery.url = Some("http://127.0.0.1:9/api".into());

        assert!(run(&ctx, 10).await.is_err());
    }

    #[test]
    fn post_line_counts_media() {
        let post = Post::from_summary(PostSummary {
            id: "p1".into(),
            content: "look".into(),
            author_address: Address::parse("0xa11ce").unwrap(),
            timestamp: board_types::now_millis(),
            content_cid: None,
            media_items: vec![PostMedia {
                content_cid: ContentId::parse("bafkreiimage").unwrap(),
                media_type: "image/png".into(),
            }],
        });

        let line = post_line(&post);
        assert!(line.starts_with("p1 0xa11ce (just now): look"));
        assert!(line.ends_with("[1 media]"));
    }

    #[test]
    fn document_lines_list_media() {
        let document = PostDocument {
            version: PostDocument::VERSION,
            content: "hello".into(),
            author_address: Address::parse("0xa11ce").unwrap(),
            timestamp: 0,
            visibility: Visibility::Followers,
            media_items: vec![PostMedia {
                content_cid: ContentId::parse("bafkreiimage").unwrap(),
                media_type: "image/png".into(),
            }],
        };

        let lines = document_lines(&document);
        assert_eq!(lines[2], "Visibility: Followers");
        assert_eq!(lines[4], "hello");
        assert_eq!(lines[5], "  <bafkreiimage> image/png");
    }
}
