//! Run the gateway cascade for an identifier.

use anyhow::{Context as _, Result};
use board_client::content_store;
use board_content::ContentStore;
use board_gateway::{GatewayResolver, HttpFetcher, Payload, Resolution};
use std::sync::Arc;

use super::Context;

/// Resolve `cid` and print where it can be rendered from.
pub async fn run(ctx: &Context, cid: &str, mime: Option<&str>) -> Result<()> {
    let store: Arc<dyn ContentStore> = Arc::new(content_store(&ctx.config().content)?);
    let resolver = GatewayResolver::new(
        ctx.config().gateway.resolver_config(),
        Arc::new(HttpFetcher::new()),
        Some(store),
    );

    let resolution = resolver
        .resolve(cid, mime)
        .await
        .context("Cannot resolve identifier")?;

    for line in describe(&resolution) {
        println!("{}", line);
    }
    Ok(())
}

fn describe(resolution: &Resolution) -> Vec<String> {
    let mut lines = vec![
        format!("Strategy: {:?}", resolution.strategy),
        format!("Kind:     {:?}", resolution.kind),
        format!(
            "Type:     {}",
            resolution.mime_type.as_deref().unwrap_or("unknown")
        ),
    ];
    match &resolution.payload {
        Payload::Url(url) => lines.push(format!("URL:      {}", url)),
        Payload::Bytes(bytes) => lines.push(format!("Bytes:    {} (inline)", bytes.len())),
    }
    if resolution.is_best_effort() {
        lines.push("Note:     no source answered; the URL is unverified".to_string());
    }
    lines
}
