//! Publish a post.

use anyhow::{Context as _, Result};
use board_client::{MediaUpload, PostDraft};
use board_types::{Address, Post, Visibility};
use clap::ValueEnum;
use std::path::PathBuf;

use super::Context;

/// Post audience on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityArg {
    /// Everyone; announced to the discovery index
    Public,
    /// The author's followers
    Followers,
    /// Only the `--allow` addresses
    Private,
}

/// Build the audience from the flag and any `--allow` addresses.
pub fn visibility(arg: VisibilityArg, allow: &[String]) -> Result<Visibility> {
    if arg != VisibilityArg::Private && !allow.is_empty() {
        anyhow::bail!("--allow only applies to --visibility private");
    }
    Ok(match arg {
        VisibilityArg::Public => Visibility::Public,
        VisibilityArg::Followers => Visibility::Followers,
        VisibilityArg::Private => Visibility::Private {
            allowed: allow
                .iter()
                .map(String::as_str)
                .map(Address::parse)
                .collect::<Result<_, _>>()
                .context("Invalid --allow address")?,
        },
    })
}

/// Upload attachments, store and announce the post.
pub async fn run(
    ctx: &Context,
    content: String,
    visibility: Visibility,
    files: &[PathBuf],
) -> Result<()> {
    let mut media = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        media.push(MediaUpload {
            filename,
            mime_type: None,
            bytes,
        });
    }

    let client = ctx.client().await?;
    let draft = PostDraft {
        content,
        visibility,
        media,
    };
    let post = client
        .feed()
        .create_post(draft)
        .await
        .context("Cannot publish post")?;

    let limited = post
        .content_cid
        .as_ref()
        .is_some_and(|cid| client.feed().ledger().has_limitation(cid));
    for line in describe(&post, files.len(), limited) {
        println!("{}", line);
    }
    Ok(())
}

fn describe(post: &Post, attempted: usize, limited: bool) -> Vec<String> {
    let mut lines = vec![format!("Posted {}", post.id)];
    match &post.content_cid {
        Some(cid) => lines.push(format!("  Stored as: {}", cid)),
        None => lines.push("  Stored as: (local only, content store unreachable)".to_string()),
    }
    if attempted > 0 {
        lines.push(format!(
            "  Media:     {} of {} attached",
            post.media_items.len(),
            attempted
        ));
    }
    if limited {
        lines.push("  Warning:   shared, but may not persist (pinning plan limit)".to_string());
    }
    lines
}
