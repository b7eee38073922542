//! BoardClient - the assembled meshboard services.
//!
//! This module wires the replicated store, sync engine, content store,
//! gateway resolver and feed service together from a [`Config`].
//!
//! ```text
//! Application → BoardClient ─┬→ SyncEngine → ReplicatedStore → Backend
//!                            ├→ FeedService → ContentStore, DiscoveryIndex
//!                            └→ GatewayResolver → Fetcher, ContentStore
//! ```
//!
//! # Example
//!
//! ```ignore
//! use meshboard_client::{BoardClient, Config};
//!
//! let config = Config::from_file("meshboard.toml".as_ref())?;
//! let client = BoardClient::from_config(config, me)?;
//! let tasks = client.start();
//!
//! let chat = client.engine().get_or_create_chat(&peer).await;
//! client.engine().send_message(&chat.id, Some("hi".into()), vec![]).await?;
//! ```

use std::sync::Arc;

use board_content::{ContentError, ContentStore, HttpContentStore, PinningService};
use board_gateway::{Fetcher, GatewayResolver, HttpFetcher};
use board_types::Address;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{Config, ContentConfig};
use crate::discovery::{DiscoveryError, DiscoveryIndex, HttpDiscovery};
use crate::engine::{spawn_sync_task, SyncEngine};
use crate::feed::{spawn_feed_poller, FeedService};
use crate::store::{Backend, CollectionNames, HttpBackend, ReplicatedStore, StoreError};

/// Errors building a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Content store setup failed.
    #[error("content store: {0}")]
    Content(#[from] ContentError),

    /// Replicated store setup failed.
    #[error("replicated store: {0}")]
    Store(#[from] StoreError),

    /// Discovery client setup failed.
    #[error("discovery index: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// External services a client talks to.
pub struct Services {
    /// Replicated document store.
    pub backend: Arc<dyn Backend>,
    /// Content-addressed store.
    pub content: Arc<dyn ContentStore>,
    /// Discovery index, if configured.
    pub discovery: Option<Arc<dyn DiscoveryIndex>>,
    /// HTTP client for gateway probes.
    pub fetcher: Arc<dyn Fetcher>,
}

/// The meshboard services for one local user.
pub struct BoardClient {
    config: Config,
    engine: Arc<SyncEngine>,
    feed: Arc<FeedService>,
    resolver: GatewayResolver,
    content: Arc<dyn ContentStore>,
}

impl BoardClient {
    /// Build a client talking to the HTTP services named in `config`.
    pub fn from_config(config: Config, me: Address) -> Result<Self, ClientError> {
        let content = content_store(&config.content)?;
        let backend = HttpBackend::new(&config.replication.url, config.replication.timeout())?;

        let discovery = match &config.discovery.url {
            Some(url) => Some(Arc::new(HttpDiscovery::new(url, config.content.timeout())?)
                as Arc<dyn DiscoveryIndex>),
            None => None,
        };

        let services = Services {
            backend: Arc::new(backend),
            content: Arc::new(content),
            discovery,
            fetcher: Arc::new(HttpFetcher::new()),
        };
        Ok(Self::with_services(config, me, services))
    }

    /// Build a client over caller-supplied services.
    pub fn with_services(config: Config, me: Address, services: Services) -> Self {
        let names = CollectionNames {
            chats: config.replication.chats_collection.clone(),
            messages: config.replication.messages_collection.clone(),
        };
        let store = Arc::new(ReplicatedStore::with_names(services.backend, names));
        let engine = Arc::new(SyncEngine::new(store, me.clone()));

        let feed = FeedService::new(me, Arc::clone(&services.content), services.discovery)
            .with_page_limit(config.discovery.page_limit);

        let resolver = GatewayResolver::new(
            config.gateway.resolver_config(),
            services.fetcher,
            Some(Arc::clone(&services.content)),
        );

        Self {
            config,
            engine,
            feed: Arc::new(feed),
            resolver,
            content: services.content,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chat sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Feed service.
    pub fn feed(&self) -> &Arc<FeedService> {
        &self.feed
    }

    /// Content resolver.
    pub fn resolver(&self) -> &GatewayResolver {
        &self.resolver
    }

    /// Content store.
    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// Spawn the periodic sync task and, if an index is configured, the feed
    /// poller.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![spawn_sync_task(
            Arc::clone(&self.engine),
            self.config.sync.clone(),
        )];
        if self.config.discovery.url.is_some() {
            tasks.push(spawn_feed_poller(
                Arc::clone(&self.feed),
                self.config.discovery.poll_interval(),
            ));
        }
        tasks
    }

    /// Stop background tasks and close the replicated store.
    pub async fn shutdown(&self, tasks: Vec<JoinHandle<()>>) {
        for task in tasks {
            task.abort();
        }
        self.engine.store().close().await;
        tracing::info!("Client shut down");
    }
}

/// The HTTP content store described by a `[content]` section, with the
/// remote pinning service attached when both endpoint and token are set.
pub fn content_store(config: &ContentConfig) -> Result<HttpContentStore, ClientError> {
    let store = HttpContentStore::new(&config.api_url, config.timeout())?;
    Ok(match (&config.pinning_endpoint, &config.pinning_token) {
        (Some(endpoint), Some(token)) => store.with_pinning_service(PinningService {
            endpoint: endpoint.clone(),
            token: token.clone(),
        }),
        _ => store,
    })
}
