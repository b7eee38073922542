//! Record the wallet address to act as.

use anyhow::{Context as _, Result};
use board_types::Address;

use super::Context;
use crate::session::{self, Session};

/// Run the login command.
pub async fn run(ctx: &Context, raw: &str) -> Result<()> {
    let address = Address::parse(raw).context("Invalid wallet address")?;

    if Session::exists(ctx.data_dir()) {
        let previous = Session::load(ctx.data_dir()).await?;
        if previous.address == address {
            println!("Already logged in as {}", address);
            return Ok(());
        }
        // Chat state is per identity.
        session::clear_state(ctx.data_dir()).await?;
        tracing::info!("Switched identity from {} to {}", previous.address, address);
    }

    Session::new(address.clone()).save(ctx.data_dir()).await?;

    println!("Logged in as {}", address);
    println!();
    println!("  Data dir: {}", ctx.data_dir().display());
    println!();
    println!("Next steps:");
    println!("  1. Message someone: meshboard chat send <address> <text>");
    println!("  2. Publish a post:  meshboard post <text>");

    Ok(())
}
