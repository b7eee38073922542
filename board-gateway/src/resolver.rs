//! Cascading content resolution.
//!
//! Given an identifier and an optional declared mime type, find something a
//! consumer can render, tolerating partial infrastructure failure:
//!
//! 1. Images go straight to the direct proxy when one is configured.
//! 2. Local node GET, then pinning proxy (HEAD probe), then preview proxy
//!    (HEAD probe).
//! 3. The content store's `get_bytes`.
//! 4. A race across the public gateways, first HEAD 200 wins.
//! 5. The default gateway URL, unverified.
//!
//! HEAD probes are bounded by the short probe timeout; the steps that
//! download a body get the longer fetch timeout. Every failed step is logged
//! and the cascade moves on. Nothing short of a
//! malformed identifier is reported as an error: content that has not
//! propagated yet still gets a URL the consumer can retry.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use board_content::ContentStore;
use board_core::{classify, MediaKind};
use board_types::ContentId;
use futures_util::future::select_ok;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::{FetchError, Fetched, Fetcher};

/// Public gateways raced when everything closer has failed.
pub const DEFAULT_PUBLIC_GATEWAYS: [&str; 4] = [
    "https://ipfs.io/ipfs/",
    "https://gateway.ipfs.io/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
    "https://dweb.link/ipfs/",
];

/// Last-resort gateway.
pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// Per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Timeout for steps that download the full body.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The identifier cannot possibly name content.
    #[error("malformed content identifier: {0:?}")]
    MalformedIdentifier(String),
}

/// Which step of the cascade produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Low-latency image proxy.
    DirectProxy,
    /// The local node's gateway.
    LocalNode,
    /// The pinning service proxy.
    PinningProxy,
    /// The generic preview proxy.
    PreviewProxy,
    /// The content store API.
    ContentStore,
    /// One of the public gateways.
    PublicGateway,
    /// Nothing answered; unverified default URL.
    DefaultGateway,
}

/// What the consumer gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A URL to fetch or embed.
    Url(String),
    /// The content itself.
    Bytes(Vec<u8>),
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved identifier.
    pub cid: ContentId,
    /// The winning step.
    pub strategy: Strategy,
    /// Final media category after type correction.
    pub kind: MediaKind,
    /// Final mime type, when known.
    pub mime_type: Option<String>,
    /// URL or bytes.
    pub payload: Payload,
}

impl Resolution {
    /// The URL, if the result is one.
    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            Payload::Url(url) => Some(url),
            Payload::Bytes(_) => None,
        }
    }

    /// The bytes, if the result carries them.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Url(_) => None,
        }
    }

    /// Bytes as a `data:` URL for inline rendering.
    pub fn data_url(&self) -> Option<String> {
        let bytes = self.bytes()?;
        let mime = self.mime_type.as_deref().unwrap_or("application/octet-stream");
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Some(format!("data:{mime};base64,{encoded}"))
    }

    /// Whether this is the unverified last resort.
    pub fn is_best_effort(&self) -> bool {
        self.strategy == Strategy::DefaultGateway
    }
}

/// Endpoints and limits for the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Image proxy base; the identifier is passed as `?cid=`.
    pub direct_proxy: Option<String>,
    /// Local node gateway base; the identifier is appended to the path.
    pub local_node: Option<String>,
    /// Pinning service proxy base; `?cid=` and `?cid=..&metadata=true`.
    pub pinning_proxy: Option<String>,
    /// Preview proxy base; `?cid=`.
    pub preview_proxy: Option<String>,
    /// Gateways raced in step 4; each is a prefix the identifier is appended to.
    pub public_gateways: Vec<String>,
    /// Prefix for the last-resort URL.
    pub default_gateway: String,
    /// Bound on each HEAD probe, metadata lookup and gateway race.
    pub probe_timeout: Duration,
    /// Bound on the steps that download content: local node and content store.
    pub fetch_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            direct_proxy: None,
            local_node: None,
            pinning_proxy: None,
            preview_proxy: None,
            public_gateways: DEFAULT_PUBLIC_GATEWAYS.iter().map(|s| s.to_string()).collect(),
            default_gateway: DEFAULT_GATEWAY.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PinMetadata {
    #[serde(rename = "MimeType", alias = "mimeType")]
    mime_type: Option<String>,
}

/// Resolves identifiers to renderable content.
pub struct GatewayResolver {
    config: ResolverConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Option<Arc<dyn ContentStore>>,
}

impl GatewayResolver {
    /// Create a resolver. Without a content store, step 3 is skipped.
    pub fn new(
        config: ResolverConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Option<Arc<dyn ContentStore>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// URL a consumer should switch to when a proxied URL fails to render.
    pub fn fallback_url(&self, cid: &ContentId) -> String {
        join_path(&self.config.default_gateway, cid.as_str())
    }

    /// Resolve `cid`, declared as `declared_mime`, to a URL or bytes.
    ///
    /// Only a malformed identifier is an error.
    pub async fn resolve(
        &self,
        cid: &str,
        declared_mime: Option<&str>,
    ) -> Result<Resolution, GatewayError> {
        let cid = ContentId::parse(cid)
            .map_err(|_| GatewayError::MalformedIdentifier(cid.to_string()))?;

        let mut mime = declared_mime.map(str::to_string);
        let mut kind = MediaKind::from_mime(declared_mime);
        let pinning_url = self
            .config
            .pinning_proxy
            .as_ref()
            .map(|base| with_cid_query(base, &cid));

        // The metadata lookup shares a window with the first network step:
        // the local node GET, or the pinning proxy HEAD when there is no
        // local node.
        let wants_metadata = kind == MediaKind::Other && pinning_url.is_some();
        let metadata = async {
            if wants_metadata {
                self.probe_metadata(&cid).await
            } else {
                None
            }
        };
        let (found, local, early_pin) = match (&self.config.local_node, &pinning_url) {
            (None, Some(url)) if wants_metadata => {
                let (found, pinned) =
                    tokio::join!(metadata, self.probe(&cid, Strategy::PinningProxy, url));
                (found, None, Some(pinned))
            }
            _ => {
                let (found, local) = tokio::join!(metadata, self.fetch_local(&cid));
                (found, local, None)
            }
        };
        if let Some(found) = found {
            tracing::debug!(cid = %cid, mime = %found, "Metadata probe reclassified content");
            kind = MediaKind::from_mime(Some(&found));
            mime = Some(found);
        }

        // 1. Images take the direct proxy.
        if kind.is_image() {
            if let Some(base) = &self.config.direct_proxy {
                let url = with_cid_query(base, &cid);
                return Ok(url_result(cid, Strategy::DirectProxy, kind, mime, url));
            }
        }

        // 2. Local node, then the proxies.
        if let Some(fetched) = local {
            let declared = mime.or(fetched.content_type);
            return Ok(bytes_result(cid, Strategy::LocalNode, declared, fetched.body));
        }

        if let Some(url) = pinning_url {
            let pinned = match early_pin {
                Some(pinned) => pinned,
                None => self.probe(&cid, Strategy::PinningProxy, &url).await,
            };
            if pinned {
                return Ok(url_result(cid, Strategy::PinningProxy, kind, mime, url));
            }
        }
        if let Some(base) = &self.config.preview_proxy {
            let url = with_cid_query(base, &cid);
            if self.probe(&cid, Strategy::PreviewProxy, &url).await {
                return Ok(url_result(cid, Strategy::PreviewProxy, kind, mime, url));
            }
        }

        // 3. Content store.
        if let Some(store) = &self.store {
            let fetch = async { Ok(store.get_bytes(&cid).await) };
            match bounded(self.config.fetch_timeout, fetch).await {
                Ok(Ok(bytes)) => {
                    return Ok(bytes_result(cid, Strategy::ContentStore, mime, bytes));
                }
                Ok(Err(e)) => {
                    tracing::debug!(cid = %cid, strategy = ?Strategy::ContentStore, error = %e, "Strategy failed");
                }
                Err(e) => {
                    tracing::debug!(cid = %cid, strategy = ?Strategy::ContentStore, error = %e, "Strategy failed");
                }
            }
        }

        // 4. Race the public gateways.
        if let Some(url) = self.race_gateways(&cid).await {
            return Ok(url_result(cid, Strategy::PublicGateway, kind, mime, url));
        }

        // 5. Give the consumer something to retry.
        let url = self.fallback_url(&cid);
        tracing::warn!(cid = %cid, url = %url, "All resolution strategies exhausted, using default gateway");
        Ok(url_result(cid, Strategy::DefaultGateway, kind, mime, url))
    }

    async fn fetch_local(&self, cid: &ContentId) -> Option<Fetched> {
        let base = self.config.local_node.as_ref()?;
        let url = join_path(base, cid.as_str());
        match bounded(self.config.fetch_timeout, self.fetcher.get(&url)).await {
            Ok(fetched) if fetched.is_success() => Some(fetched),
            Ok(fetched) => {
                tracing::debug!(cid = %cid, strategy = ?Strategy::LocalNode, status = fetched.status, "Strategy failed");
                None
            }
            Err(e) => {
                tracing::debug!(cid = %cid, strategy = ?Strategy::LocalNode, error = %e, "Strategy failed");
                None
            }
        }
    }

    async fn probe_metadata(&self, cid: &ContentId) -> Option<String> {
        let base = self.config.pinning_proxy.as_ref()?;
        let url = format!("{}&metadata=true", with_cid_query(base, cid));
        let fetched = match bounded(self.config.probe_timeout, self.fetcher.get(&url)).await {
            Ok(fetched) if fetched.is_success() => fetched,
            Ok(fetched) => {
                tracing::debug!(cid = %cid, status = fetched.status, "Metadata probe failed");
                return None;
            }
            Err(e) => {
                tracing::debug!(cid = %cid, error = %e, "Metadata probe failed");
                return None;
            }
        };
        match serde_json::from_slice::<PinMetadata>(&fetched.body) {
            Ok(meta) => meta.mime_type.filter(|m| !m.trim().is_empty()),
            Err(e) => {
                tracing::debug!(cid = %cid, error = %e, "Metadata probe returned unreadable body");
                None
            }
        }
    }

    async fn probe(&self, cid: &ContentId, strategy: Strategy, url: &str) -> bool {
        match bounded(self.config.probe_timeout, self.fetcher.head(url)).await {
            Ok(status) if (200..300).contains(&status) => true,
            Ok(status) => {
                tracing::debug!(cid = %cid, strategy = ?strategy, status, "Strategy failed");
                false
            }
            Err(e) => {
                tracing::debug!(cid = %cid, strategy = ?strategy, error = %e, "Strategy failed");
                false
            }
        }
    }

    async fn race_gateways(&self, cid: &ContentId) -> Option<String> {
        if self.config.public_gateways.is_empty() {
            return None;
        }
        let probes = self.config.public_gateways.iter().map(|gateway| {
            let url = join_path(gateway, cid.as_str());
            async move {
                match bounded(self.config.probe_timeout, self.fetcher.head(&url)).await {
                    Ok(200) => Ok(url),
                    Ok(status) => {
                        tracing::debug!(cid = %cid, gateway = %url, status, "Gateway probe failed");
                        Err(())
                    }
                    Err(e) => {
                        tracing::debug!(cid = %cid, gateway = %url, error = %e, "Gateway probe failed");
                        Err(())
                    }
                }
            }
            .boxed()
        });
        select_ok(probes).await.ok().map(|(url, _rest)| url)
    }

}

async fn bounded<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(FetchError::Timeout))
}

fn url_result(
    cid: ContentId,
    strategy: Strategy,
    kind: MediaKind,
    mime: Option<String>,
    url: String,
) -> Resolution {
    Resolution {
        cid,
        strategy,
        kind,
        mime_type: mime,
        payload: Payload::Url(url),
    }
}

fn bytes_result(
    cid: ContentId,
    strategy: Strategy,
    declared: Option<String>,
    bytes: Vec<u8>,
) -> Resolution {
    let (kind, mime) = classify(declared.as_deref(), &bytes);
    Resolution {
        cid,
        strategy,
        kind,
        mime_type: Some(mime),
        payload: Payload::Bytes(bytes),
    }
}

fn join_path(base: &str, cid: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{cid}")
    } else {
        format!("{base}/{cid}")
    }
}

fn with_cid_query(base: &str, cid: &ContentId) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}cid={cid}")
}
