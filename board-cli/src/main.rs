//! # meshboard
//!
//! Command-line client for meshboard.
//!
//! ## Commands
//!
//! - `login`: Record the wallet address this data directory acts for
//! - `status`: Show session, endpoints and local chat state
//! - `put` / `cat` / `pin`: Content store operations
//! - `resolve`: Run the gateway cascade for an identifier
//! - `chat send|list|show|edit|delete|sync`: Replicated chats
//! - `post`: Publish a post
//! - `feed`: Refresh and print the feed
//!
//! ## Example
//!
//! ```bash
//! meshboard login 0xA11CE
//! meshboard chat send 0xB0B "hello"
//! meshboard chat sync
//! meshboard put ./photo.png
//! meshboard resolve bafy... --mime image/png
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use board_client::{Config, DEFAULT_CONFIG_FILE};

mod commands;
mod session;

use commands::post::VisibilityArg;
use commands::{chat, content, feed, login, post, resolve, status, Context};

/// Command-line client for meshboard.
#[derive(Parser, Debug)]
#[command(name = "meshboard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the session and local chat state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to meshboard.toml in the data directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the wallet address to act as
    Login {
        /// Wallet address
        address: String,
    },

    /// Show session, endpoints and local chat state
    Status,

    /// Store a file in the content store and print its identifier
    Put {
        /// File to store
        file: PathBuf,

        /// Declared mime type
        #[arg(long)]
        mime: Option<String>,

        /// Store without pinning
        #[arg(long)]
        no_pin: bool,
    },

    /// Fetch content by identifier
    Cat {
        /// Content identifier
        cid: String,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Ask the content store to persist an identifier
    Pin {
        /// Content identifier
        cid: String,
    },

    /// Find a renderable location for an identifier
    Resolve {
        /// Content identifier
        cid: String,

        /// Declared mime type
        #[arg(long)]
        mime: Option<String>,
    },

    /// Replicated chats
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Publish a post
    Post {
        /// Post text
        content: String,

        /// Audience
        #[arg(long, value_enum, default_value = "public")]
        visibility: VisibilityArg,

        /// Address allowed to read a private post (repeatable)
        #[arg(long)]
        allow: Vec<String>,

        /// File to attach (repeatable)
        #[arg(long, short)]
        file: Vec<PathBuf>,
    },

    /// Refresh the feed from the discovery index and print it
    Feed {
        /// Print at most this many posts
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print the stored copy of one post instead
        #[arg(long)]
        show: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ChatAction {
    /// Send a message, then try to push it
    Send {
        /// Peer wallet address
        peer: String,

        /// Message text
        message: Option<String>,

        /// Attach an already stored identifier (repeatable)
        #[arg(long)]
        media: Vec<String>,
    },

    /// List chats, most recent first
    List,

    /// Print a chat's messages and mark it read
    Show {
        /// Peer wallet address
        peer: String,
    },

    /// Replace the text of one of your messages
    Edit {
        /// Peer wallet address
        peer: String,

        /// Message id
        id: String,

        /// New text
        text: String,
    },

    /// Delete one of your messages
    Delete {
        /// Peer wallet address
        peer: String,

        /// Message id
        id: String,
    },

    /// Run one reconciliation pass
    Sync,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let explicit_config = match &cli.config {
        Some(path) => Some(
            Config::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        ),
        None => None,
    };

    // Determine data directory
    let configured_dir = explicit_config
        .as_ref()
        .and_then(|config| config.identity.data_dir.clone());
    let data_dir = match cli.data_dir.or(configured_dir) {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config = match explicit_config {
        Some(config) => config,
        None => config_in(&data_dir)?,
    };
    let ctx = Context::new(data_dir, config);

    match cli.command {
        Commands::Login { address } => login::run(&ctx, &address).await,
        Commands::Status => status::run(&ctx).await,
        Commands::Put { file, mime, no_pin } => content::put(&ctx, &file, mime, !no_pin).await,
        Commands::Cat { cid, output } => content::cat(&ctx, &cid, output.as_deref()).await,
        Commands::Pin { cid } => content::pin(&ctx, &cid).await,
        Commands::Resolve { cid, mime } => resolve::run(&ctx, &cid, mime.as_deref()).await,
        Commands::Chat { action } => match action {
            ChatAction::Send {
                peer,
                message,
                media,
            } => chat::send(&ctx, &peer, message, &media).await,
            ChatAction::List => chat::list(&ctx).await,
            ChatAction::Show { peer } => chat::show(&ctx, &peer).await,
            ChatAction::Edit { peer, id, text } => chat::edit(&ctx, &peer, &id, text).await,
            ChatAction::Delete { peer, id } => chat::delete(&ctx, &peer, &id).await,
            ChatAction::Sync => chat::sync(&ctx).await,
        },
        Commands::Post {
            content,
            visibility,
            allow,
            file,
        } => {
            let visibility = post::visibility(visibility, &allow)?;
            post::run(&ctx, content, visibility, &file).await
        }
        Commands::Feed { limit, show } => match show {
            Some(cid) => feed::show(&ctx, &cid).await,
            None => feed::run(&ctx, limit).await,
        },
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,meshboard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `meshboard.toml` in the data directory, or defaults.
fn config_in(data_dir: &Path) -> Result<Config> {
    let path = data_dir.join(DEFAULT_CONFIG_FILE);
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::from_file(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Get the default data directory for meshboard.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "meshboard", "meshboard")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
