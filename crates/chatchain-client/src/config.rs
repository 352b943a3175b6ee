//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs against a local dev node
//! with zero configuration.

use std::time::Duration;

use alloy_primitives::Address;

use chatchain_shared::constants::{
    COUNTDOWN_TICK_SECS, DEFAULT_CHAT_CONTRACT, DEFAULT_RPC_URL, DEFAULT_TOKEN_CONTRACT,
    FAUCET_POLL_SECS, FRIENDS_POLL_SECS, HISTORY_LOOKBACK_BLOCKS, MESSAGES_POLL_SECS,
    PENDING_POLL_SECS, RECEIPT_POLL_MS,
};
use chatchain_shared::types::parse_address;

/// Cadences of the background pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Env: `FRIENDS_POLL_SECS`, default 30 s.
    pub friends: Duration,
    /// Open conversation. Env: `MESSAGES_POLL_SECS`, default 10 s.
    pub messages: Duration,
    /// Pending messages from non-friends. Env: `PENDING_POLL_SECS`, default 30 s.
    pub pending: Duration,
    /// Balance and cooldown while the faucet view is open.
    /// Env: `FAUCET_POLL_SECS`, default 60 s.
    pub faucet: Duration,
    /// Local countdown tick. Not configurable.
    pub countdown: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            friends: Duration::from_secs(FRIENDS_POLL_SECS),
            messages: Duration::from_secs(MESSAGES_POLL_SECS),
            pending: Duration::from_secs(PENDING_POLL_SECS),
            faucet: Duration::from_secs(FAUCET_POLL_SECS),
            countdown: Duration::from_secs(COUNTDOWN_TICK_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// JSON-RPC endpoint used by the HTTP provider.
    /// Env: `CHATCHAIN_RPC_URL`
    /// Default: `http://127.0.0.1:8545`
    pub rpc_url: String,

    /// Chat / user-registry contract.
    /// Env: `CHAT_CONTRACT_ADDRESS`
    pub chat_contract: Address,

    /// CHAT token contract.
    /// Env: `TOKEN_CONTRACT_ADDRESS`
    pub token_contract: Address,

    /// How many blocks back the transaction history reaches.
    /// Env: `HISTORY_LOOKBACK_BLOCKS`
    /// Default: `10000`
    pub history_lookback_blocks: u64,

    /// Delay between two receipt polls while confirming a transaction.
    /// Env: `RECEIPT_POLL_MS`
    /// Default: `1000`
    pub receipt_poll_interval: Duration,

    pub poll: PollIntervals,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chat_contract: parse_address(DEFAULT_CHAT_CONTRACT).unwrap_or_default(),
            token_contract: parse_address(DEFAULT_TOKEN_CONTRACT).unwrap_or_default(),
            history_lookback_blocks: HISTORY_LOOKBACK_BLOCKS,
            receipt_poll_interval: Duration::from_millis(RECEIPT_POLL_MS),
            poll: PollIntervals::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("CHATCHAIN_RPC_URL") {
            if !url.trim().is_empty() {
                config.rpc_url = url.trim().to_string();
            }
        }

        if let Some(raw) = lookup("CHAT_CONTRACT_ADDRESS") {
            match parse_address(&raw) {
                Some(addr) => config.chat_contract = addr,
                None => tracing::warn!(value = %raw, "Invalid CHAT_CONTRACT_ADDRESS, using default"),
            }
        }

        if let Some(raw) = lookup("TOKEN_CONTRACT_ADDRESS") {
            match parse_address(&raw) {
                Some(addr) => config.token_contract = addr,
                None => tracing::warn!(value = %raw, "Invalid TOKEN_CONTRACT_ADDRESS, using default"),
            }
        }

        if let Some(n) = parse_number(&lookup, "HISTORY_LOOKBACK_BLOCKS") {
            config.history_lookback_blocks = n;
        }

        if let Some(ms) = parse_number(&lookup, "RECEIPT_POLL_MS") {
            config.receipt_poll_interval = Duration::from_millis(ms.max(1));
        }

        // -- Pollers --

        let secs = |key: &str, slot: &mut Duration| {
            if let Some(n) = parse_number(&lookup, key) {
                if n == 0 {
                    tracing::warn!(key, "Poll interval must be positive, using default");
                } else {
                    *slot = Duration::from_secs(n);
                }
            }
        };
        secs("FRIENDS_POLL_SECS", &mut config.poll.friends);
        secs("MESSAGES_POLL_SECS", &mut config.poll.messages);
        secs("PENDING_POLL_SECS", &mut config.poll.pending);
        secs("FAUCET_POLL_SECS", &mut config.poll.faucet);

        // RUST_LOG is read by tracing-subscriber directly.

        config
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid number, using default");
            None
        }
    }
}
