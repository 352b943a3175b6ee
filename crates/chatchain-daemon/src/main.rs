//! # chatchain-daemon
//!
//! Command-line driver for the ChatChain client core.
//!
//! Connects through a JSON-RPC node that holds unlocked accounts and either
//! runs one write or read and exits, or (`watch`) keeps the pollers running
//! and prints every client event as a JSON line until Ctrl+C.

mod commands;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use chatchain_chain::HttpProvider;
use chatchain_client::{ClientConfig, SessionManager};
use chatchain_shared::constants::APP_NAME;

#[derive(Debug, Parser)]
#[command(name = "chatchain", version, about = "ChatChain command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll friends, pending messages and faucet state until Ctrl+C
    Watch {
        /// Also follow the conversation with this address
        #[arg(long)]
        chat: Option<String>,
    },
    /// Show recent on-chain activity of the account
    History,
    /// List registered users and mark friends
    Users,
    /// Claim the faucet grant
    Faucet,
    /// Register the account under a display name
    Register { name: String },
    /// Add a friend by address
    AddFriend { address: String },
    /// Send a message (costs the message fee)
    SendMessage { to: String, text: String },
    /// Send tokens to a friend
    SendTokens { to: String, amount: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    chatchain_client::init_tracing();
    let cli = Cli::parse();

    info!("Starting {APP_NAME} daemon v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the wallet session
    // -----------------------------------------------------------------------
    let provider = Arc::new(HttpProvider::new(config.rpc_url.clone()));
    let manager = Arc::new(SessionManager::with_provider(provider, config));

    let block = manager
        .check_network()
        .await
        .with_context(|| format!("node at {} is unreachable", manager.config().rpc_url))?;
    info!(block, "Node reachable");

    let session = match manager.restore().await {
        Some(session) => session,
        None => manager.connect().await.context("wallet connection failed")?,
    };
    info!(account = %session.account(), "Session ready");

    // Account switches on the node side are pushed by the provider
    let watcher = manager.watch_accounts();

    // -----------------------------------------------------------------------
    // 4. Run the command
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = commands::run(cli.command, manager.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    manager.disconnect();
    result
}
