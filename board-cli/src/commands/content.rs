//! Content store commands: put, cat, pin.

use anyhow::{Context as _, Result};
use board_client::content_store;
use board_content::{ContentStore, PinOutcome, PutOptions};
use board_types::ContentId;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::Context;

/// Store a file and print its identifier.
pub async fn put(ctx: &Context, file: &Path, mime: Option<String>, pin: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let store = content_store(&ctx.config().content)?;
    let options = PutOptions {
        filename,
        mime_type: mime,
        pin,
    };
    let cid = store
        .put_bytes(&bytes, options)
        .await
        .context("Failed to store content")?;

    tracing::info!(cid = %cid, size = bytes.len(), "Stored content");
    println!("{}", cid);
    Ok(())
}

/// Fetch content and write it to stdout or a file.
pub async fn cat(ctx: &Context, raw: &str, output: Option<&Path>) -> Result<()> {
    let cid = ContentId::parse(raw).context("Invalid content identifier")?;
    let store = content_store(&ctx.config().content)?;
    let bytes = store
        .get_bytes(&cid)
        .await
        .with_context(|| format!("Failed to fetch {}", cid))?;

    match output {
        Some(path) => tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// Pin an identifier and report the outcome.
pub async fn pin(ctx: &Context, raw: &str) -> Result<()> {
    let cid = ContentId::parse(raw).context("Invalid content identifier")?;
    let store = content_store(&ctx.config().content)?;

    match store.pin(&cid).await {
        PinOutcome::Pinned => println!("Pinned {}", cid),
        PinOutcome::LimitedPlan { reason } => {
            println!("Shared {}, but it may not persist ({})", cid, reason);
        }
        PinOutcome::Failed { reason } => anyhow::bail!("Pin failed for {}: {}", cid, reason),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::offline_context;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_missing_file_fails() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        let err = put(&ctx, &dir.path().join("absent.bin"), None, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("absent.bin"));
    }

    #[tokio::test]
    async fn put_with_unreachable_node_fails() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        let file = dir.path().join("note.txt");
        tokio::fs::write(&file, b"hello").await.unwrap();

        assert!(put(&ctx, &file, None, true).await.is_err());
    }

    #[tokio::test]
    async fn cat_rejects_malformed_identifier() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        let err = cat(&ctx, "not a cid", None).await.unwrap_err();
        assert!(err.to_string().contains("Invalid content identifier"));
    }

    #[tokio::test]
    async fn pin_with_unreachable_node_fails() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        assert!(pin(&ctx, "bafkreiexample").await.is_err());
    }
}
