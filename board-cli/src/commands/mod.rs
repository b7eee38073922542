//! CLI command implementations.

pub mod chat;
pub mod content;
pub mod feed;
pub mod login;
pub mod post;
pub mod resolve;
pub mod status;

use anyhow::{Context as _, Result};
use board_client::{BoardClient, Config};
use board_types::Address;
use std::path::{Path, PathBuf};

use crate::session::{self, Session};

/// Resolved data directory and configuration for one invocation.
pub struct Context {
    data_dir: PathBuf,
    config: Config,
}

impl Context {
    /// Bundle a data directory with its configuration.
    pub fn new(data_dir: PathBuf, config: Config) -> Self {
        Self { data_dir, config }
    }

    /// Where the session and state files live.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The address to act as: the session, else `[identity] address`.
    pub async fn identity(&self) -> Result<Address> {
        if Session::exists(&self.data_dir) {
            return Ok(Session::load(&self.data_dir).await?.address);
        }
        match &self.config.identity.address {
            Some(raw) => Address::parse(raw).context("Invalid [identity] address"),
            None => Session::load(&self.data_dir).await.map(|s| s.address),
        }
    }

    /// Build a client and restore the saved chat state into it.
    pub async fn client(&self) -> Result<BoardClient> {
        let me = self.identity().await?;
        let client = BoardClient::from_config(self.config.clone(), me)
            .context("Failed to set up services")?;
        if let Some(state) = session::load_state(&self.data_dir).await? {
            client
                .engine()
                .restore(state)
                .await
                .context("Saved chat state belongs to another address")?;
        }
        Ok(client)
    }

    /// Persist the client's chat state.
    pub async fn save(&self, client: &BoardClient) -> Result<()> {
        let state = client.engine().snapshot().await;
        session::save_state(&self.data_dir, &state).await
    }
}

/// Shorten long identifiers for display.
pub fn short(value: &str) -> &str {
    value.get(..16).unwrap_or(value)
}

/// Format a millisecond Unix timestamp relative to now.
pub fn format_timestamp(ts_millis: u64) -> String {
    let now = board_types::now_millis() / 1000;
    let diff = now.saturating_sub(ts_millis / 1000);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A context whose services all point at a closed local port.
    pub(crate) fn offline_context(dir: &Path) -> Context {
        let mut config = Config::default();
        config.content.api_url = "http://127.0.0.1:9".into();
        config.content.timeout_secs = 1;
        config.replication.url = "http://127.0.0.1:9".into();
        config.replication.timeout_secs = 1;
        config.gateway.public_gateways = vec![];
        config.gateway.probe_timeout_ms = 200;
        config.gateway.fetch_timeout_ms = 1000;
        Context::new(dir.to_path_buf(), config)
    }

    #[tokio::test]
    async fn identity_prefers_session() {
        let dir = tempdir().unwrap();
        let mut ctx = offline_context(dir.path());
        ctx.config.identity.address = Some("0xC0FFEE".into());
        assert_eq!(ctx.identity().await.unwrap().as_str(), "0xc0ffee");

        Session::new(Address::parse("0xa11ce").unwrap())
            .save(dir.path())
            .await
            .unwrap();
        assert_eq!(ctx.identity().await.unwrap().as_str(), "0xa11ce");
    }

    #[tokio::test]
    async fn identity_without_session_or_config_fails() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        assert!(ctx.identity().await.is_err());
    }

    #[tokio::test]
    async fn client_restores_saved_state() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        Session::new(Address::parse("0xa11ce").unwrap())
            .save(dir.path())
            .await
            .unwrap();

        let mut state = board_core::LocalState::new(Address::parse("0xa11ce").unwrap());
        state.get_or_create_chat(&Address::parse("0xb0b").unwrap());
        session::save_state(dir.path(), &state).await.unwrap();

        let client = ctx.client().await.unwrap();
        assert_eq!(client.engine().chat_list().await.len(), 1);
    }

    #[tokio::test]
    async fn client_rejects_state_of_another_address() {
        let dir = tempdir().unwrap();
        let ctx = offline_context(dir.path());
        Session::new(Address::parse("0xa11ce").unwrap())
            .save(dir.path())
            .await
            .unwrap();
        let state = board_core::LocalState::new(Address::parse("0xb0b").unwrap());
        session::save_state(dir.path(), &state).await.unwrap();

        assert!(ctx.client().await.is_err());
    }

    #[test]
    fn short_truncates_long_values() {
        assert_eq!(short("bafkreiabcdefghijklmnop"), "bafkreiabcdefghi");
        assert_eq!(short("0xb0b"), "0xb0b");
    }

    #[test]
    fn format_timestamp_works() {
        let now = board_types::now_millis();
        assert_eq!(format_timestamp(now), "just now");
        assert!(format_timestamp(now - 120_000).contains("minutes"));
        assert!(format_timestamp(now - 7_200_000).contains("hours"));
        assert!(format_timestamp(now - 172_800_000).contains("days"));
    }
}
