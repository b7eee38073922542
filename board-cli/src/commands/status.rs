//! Show session, endpoints and local chat state.

use anyhow::Result;

use super::{format_timestamp, Context};
use crate::session::{self, Session};

/// Run the status command. Never touches the network.
pub async fn run(ctx: &Context) -> Result<()> {
    println!("=== meshboard status ===");
    println!();

    match Session::load(ctx.data_dir()).await {
        Ok(session) => {
            println!("Session:");
            println!("  Address: {}", session.address);
            println!("  Since:   {}", format_timestamp(session.created_at));
        }
        Err(_) => {
            println!("Session: NOT LOGGED IN");
            println!();
            println!("Run 'meshboard login <address>' to start.");
            return Ok(());
        }
    }
    println!("  Data:    {}", ctx.data_dir().display());

    println!();
    let config = ctx.config();
    println!("Services:");
    println!("  Content store: {}", config.content.api_url);
    println!("  Documents:     {}", config.replication.url);
    println!(
        "  Discovery:     {}",
        config.discovery.url.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "  Gateways:      {} public, default {}",
        config.gateway.public_gateways.len(),
        config.gateway.default_gateway
    );

    println!();
    match session::load_state(ctx.data_dir()).await? {
        Some(state) => {
            println!("Chats:");
            println!("  Known:  {}", state.chat_ids().len());
            println!("  Unread: {}", state.total_unread());
        }
        None => println!("Chats: none yet"),
    }

    Ok(())
}
