//! Configuration loading for meshboard clients.
//!
//! Configuration is loaded from a TOML file (default: `meshboard.toml`).
//! Every section and field is optional; missing values take the defaults
//! below.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use board_gateway::{ResolverConfig, DEFAULT_GATEWAY, DEFAULT_PUBLIC_GATEWAYS};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "meshboard.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Local identity.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Content-addressed node.
    #[serde(default)]
    pub content: ContentConfig,
    /// Gateway resolution.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Replicated document store.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Chat sync scheduling.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Post discovery index.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Identity configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Wallet address of the local user. Overrides the saved session.
    pub address: Option<String>,
    /// Directory for session and state files (default: platform data dir).
    pub data_dir: Option<PathBuf>,
}

/// Content node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// RPC API base URL of the content node (default: http://127.0.0.1:5001).
    #[serde(default = "default_content_api")]
    pub api_url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_content_timeout")]
    pub timeout_secs: u64,
    /// Remote pinning service endpoint (optional).
    pub pinning_endpoint: Option<String>,
    /// Bearer token for the pinning service.
    pub pinning_token: Option<String>,
}

/// Gateway resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Image proxy base URL.
    pub direct_proxy: Option<String>,
    /// Local node gateway base URL.
    pub local_node: Option<String>,
    /// Pinning service proxy base URL.
    pub pinning_proxy: Option<String>,
    /// Generic preview proxy base URL.
    pub preview_proxy: Option<String>,
    /// Public gateways raced as a late fallback.
    #[serde(default = "default_public_gateways")]
    pub public_gateways: Vec<String>,
    /// Last-resort gateway prefix.
    #[serde(default = "default_gateway")]
    pub default_gateway: String,
    /// Timeout for each probe in milliseconds (default: 2000).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Timeout for downloading content from the local node or content store
    /// in milliseconds (default: 10000).
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

/// Replicated document store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Base URL of the document service (default: http://127.0.0.1:7070).
    #[serde(default = "default_replication_url")]
    pub url: String,
    /// Collection holding chat documents (default: chats).
    #[serde(default = "default_chats_collection")]
    pub chats_collection: String,
    /// Collection holding message documents (default: messages).
    #[serde(default = "default_messages_collection")]
    pub messages_collection: String,
    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_replication_timeout")]
    pub timeout_secs: u64,
}

/// Chat sync scheduling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval between reconciliation passes in seconds (default: 30).
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Run passes in the background (default: true).
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
}

/// Discovery index configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Base URL of the discovery index (optional; posts stay local without it).
    pub url: Option<String>,
    /// Feed poll interval in seconds (default: 300).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Posts requested per page (default: 50).
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

// Default value functions
fn default_content_api() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_content_timeout() -> u64 {
    30
}

fn default_public_gateways() -> Vec<String> {
    DEFAULT_PUBLIC_GATEWAYS.iter().map(|s| s.to_string()).collect()
}

fn default_gateway() -> String {
    DEFAULT_GATEWAY.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_replication_url() -> String {
    "http://127.0.0.1:7070".to_string()
}

fn default_chats_collection() -> String {
    "chats".to_string()
}

fn default_messages_collection() -> String {
    "messages".to_string()
}

fn default_replication_timeout() -> u64 {
    10
}

fn default_sync_interval() -> u64 {
    30
}

fn default_sync_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_page_limit() -> usize {
    50
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_url: default_content_api(),
            timeout_secs: default_content_timeout(),
            pinning_endpoint: None,
            pinning_token: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            direct_proxy: None,
            local_node: None,
            pinning_proxy: None,
            preview_proxy: None,
            public_gateways: default_public_gateways(),
            default_gateway: default_gateway(),
            probe_timeout_ms: default_probe_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            url: default_replication_url(),
            chats_collection: default_chats_collection(),
            messages_collection: default_messages_collection(),
            timeout_secs: default_replication_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            enabled: default_sync_enabled(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_secs: default_poll_interval(),
            page_limit: default_page_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl ContentConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GatewayConfig {
    /// Resolver settings for this configuration.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            direct_proxy: self.direct_proxy.clone(),
            local_node: self.local_node.clone(),
            pinning_proxy: self.pinning_proxy.clone(),
            preview_proxy: self.preview_proxy.clone(),
            public_gateways: self.public_gateways.clone(),
            default_gateway: self.default_gateway.clone(),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }
}

impl ReplicationConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// Interval between passes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl DiscoveryConfig {
    /// Interval between feed polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
