//! One handler per subcommand.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{TimeZone, Utc};
use tracing::{error, info};

use chatchain_chain::HttpProvider;
use chatchain_client::directory::{load_directory, NameBook};
use chatchain_client::{
    fetch_history, EventSink, Orchestrator, Pollers, Reads, SessionManager, TaskScope,
};
use chatchain_shared::constants::TOKEN_SYMBOL;
use chatchain_shared::cooldown::format_hms;
use chatchain_shared::error::WriteResult;
use chatchain_shared::types::parse_address;
use chatchain_shared::Address;

use crate::Command;

type Manager = Arc<SessionManager<HttpProvider>>;

pub async fn run(command: Command, manager: Manager) -> anyhow::Result<()> {
    match command {
        Command::Watch { chat } => watch(manager, chat).await,
        Command::History => history(manager).await,
        Command::Users => users(manager).await,
        Command::Faucet => faucet(manager).await,
        Command::Register { name } => {
            let profile = report(orchestrator(&manager).register_user(&name).await)?;
            println!("Registered as {} ({})", profile.name, profile.address);
            Ok(())
        }
        Command::AddFriend { address } => {
            let friend = address_arg(&address)?;
            let tx = report(orchestrator(&manager).add_friend(friend).await)?;
            println!("Friend added in {tx}");
            Ok(())
        }
        Command::SendMessage { to, text } => {
            let to = address_arg(&to)?;
            let tx = report(orchestrator(&manager).send_message(to, &text).await)?;
            println!("Message sent in {tx}");
            Ok(())
        }
        Command::SendTokens { to, amount } => {
            let to = address_arg(&to)?;
            let tx = report(orchestrator(&manager).send_tokens_to_friend(to, &amount).await)?;
            println!("Sent {amount} {TOKEN_SYMBOL} in {tx}");
            Ok(())
        }
    }
}

fn orchestrator(manager: &Manager) -> Orchestrator<HttpProvider> {
    Orchestrator::new(manager.clone(), EventSink::disabled())
}

fn address_arg(raw: &str) -> anyhow::Result<Address> {
    parse_address(raw).ok_or_else(|| anyhow!("not an address: {raw}"))
}

/// Log the failure with its step and surface the user-facing text.
fn report<T>(result: WriteResult<T>) -> anyhow::Result<T> {
    result.map_err(|failure| {
        error!(step = %failure.step, error = %failure.error, tx = ?failure.tx_hash, "Write failed");
        anyhow!(failure.user_message())
    })
}

async fn watch(manager: Manager, chat: Option<String>) -> anyhow::Result<()> {
    let reads = Reads::new(manager.clone());
    if let Some(raw) = chat {
        let peer = address_arg(&raw)?;
        let user = reads
            .get_user_by_address(peer)
            .await
            .with_context(|| format!("{peer} is not a registered user"))?;
        manager.set_handoff(user);
    }

    let (events, mut rx) = EventSink::channel();
    let pollers = Pollers::new(manager.clone(), events);
    let mut scope = TaskScope::bound_to(&manager);
    pollers.watch_friends(&mut scope);
    pollers.watch_pending(&mut scope);
    pollers.watch_faucet(&mut scope);
    if let Some(peer) = manager.take_handoff() {
        info!(peer = %peer.address, name = %peer.name, "Following conversation");
        pollers.watch_conversation(&mut scope, peer.address);
    }
    // the channel closes once every task of the scope has ended
    drop(pollers);

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(event = event.name(), error = %e, "Failed to serialize event"),
        }
    }
    bail!("wallet session ended")
}

async fn history(manager: Manager) -> anyhow::Result<()> {
    let session = manager.current().context("no wallet session")?;
    let reads = Reads::new(manager.clone());
    let (records, users) = tokio::join!(
        fetch_history(&session, manager.config().history_lookback_blocks),
        reads.get_all_users(),
    );
    let names = NameBook::from_users(&users);

    if records.is_empty() {
        println!("No activity in the last {} blocks", manager.config().history_lookback_blocks);
    }
    for record in records {
        let when = Utc
            .timestamp_opt(record.timestamp_secs as i64, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.timestamp_secs.to_string());
        let counterparty = if record.from == Some(session.account()) {
            record.to
        } else {
            record.from
        };
        let who = counterparty
            .map(|a| names.label(&a))
            .unwrap_or_else(|| "-".to_string());
        let amount = record
            .amount
            .map(|a| format!(" {a} {TOKEN_SYMBOL}"))
            .unwrap_or_default();
        println!("{when}  {:<16} {who}{amount}  {}", record.kind.label(), record.tx_hash);
    }
    Ok(())
}

async fn users(manager: Manager) -> anyhow::Result<()> {
    let entries = load_directory(&Reads::new(manager)).await;
    for entry in entries {
        let marker = if entry.is_friend { "*" } else { " " };
        println!("{marker} {:<20} {}", entry.profile.name, entry.profile.address);
    }
    Ok(())
}

async fn faucet(manager: Manager) -> anyhow::Result<()> {
    let snapshot = manager.snapshot();
    println!(
        "Balance {} {TOKEN_SYMBOL}, next claim in {}",
        snapshot.balance,
        format_hms(snapshot.cooldown.remaining())
    );

    report(orchestrator(&manager).request_tokens().await)?;
    let snapshot = manager.snapshot();
    println!(
        "Claimed. Balance {} {TOKEN_SYMBOL}, next claim in {}",
        snapshot.balance,
        snapshot.cooldown.display()
    );
    Ok(())
}
