//! Files persisted in the data directory.
//!
//! - `session.json`: the wallet address this directory acts for
//! - `state.json`: the local chat state between invocations

use anyhow::{Context, Result};
use board_core::LocalState;
use board_types::{now_millis, Address};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SESSION_FILE: &str = "session.json";
const STATE_FILE: &str = "state.json";

/// The logged-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Normalised wallet address.
    pub address: Address,
    /// When the session was created (ms since epoch).
    pub created_at: u64,
}

impl Session {
    /// Create a session for `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            created_at: now_millis(),
        }
    }

    /// Load the session from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SESSION_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not logged in. Run 'meshboard login <address>' first.")?;
        serde_json::from_str(&contents).context("Invalid session file")
    }

    /// Save the session to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SESSION_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save session")?;
        set_file_permissions_0600(&path).await
    }

    /// Check if a session exists.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(SESSION_FILE).exists()
    }
}

/// Load the local chat state, if one was saved.
pub async fn load_state(data_dir: &Path) -> Result<Option<LocalState>> {
    let path = data_dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents = tokio::fs::read_to_string(&path)
        .await
        .context("Failed to read local state")?;
    let state = serde_json::from_str(&contents).context("Invalid local state file")?;
    Ok(Some(state))
}

/// Save the local chat state.
pub async fn save_state(data_dir: &Path, state: &LocalState) -> Result<()> {
    let path = data_dir.join(STATE_FILE);
    let contents = serde_json::to_string(state)?;
    tokio::fs::write(&path, contents)
        .await
        .context("Failed to save local state")?;
    set_file_permissions_0600(&path).await
}

/// Remove the saved local state.
pub async fn clear_state(data_dir: &Path) -> Result<()> {
    let path = data_dir.join(STATE_FILE);
    if path.exists() {
        tokio::fs::remove_file(&path)
            .await
            .context("Failed to remove local state")?;
    }
    Ok(())
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
