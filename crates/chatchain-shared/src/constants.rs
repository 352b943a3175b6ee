/// Application name
pub const APP_NAME: &str = "ChatChain";

/// Ticker of the fungible token used for fees
pub const TOKEN_SYMBOL: &str = "CHAT";

/// Fixed-point decimals of the token contract
pub const TOKEN_DECIMALS: u8 = 18;

/// Fee charged per message, in human units
pub const MESSAGE_FEE: &str = "0.01";

/// Amount granted per faucet claim, in human units
pub const FAUCET_GRANT: &str = "10";

/// Content prefix marking a contract-generated notice (e.g. token transfers)
pub const SYSTEM_MESSAGE_PREFIX: &str = "SYSTEM:";

/// Minimum length of a display name at registration
pub const MIN_NAME_LEN: usize = 2;

/// Default deployment of the chat / user-registry contract
pub const DEFAULT_CHAT_CONTRACT: &str = "0x0797Ebf0f6d74aCDB6E5c10443270429B2609651";

/// Default deployment of the token contract
pub const DEFAULT_TOKEN_CONTRACT: &str = "0x39BE390C81c1bF662A2827604a6528d18133825d";

/// Default JSON-RPC endpoint (local dev node)
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// How far back the transaction history looks, in blocks
pub const HISTORY_LOOKBACK_BLOCKS: u64 = 10_000;

/// Interval between receipt polls while waiting for a confirmation
pub const RECEIPT_POLL_MS: u64 = 1_000;

/// Polling cadences in seconds
pub const FRIENDS_POLL_SECS: u64 = 30;
pub const MESSAGES_POLL_SECS: u64 = 10;
pub const PENDING_POLL_SECS: u64 = 30;
pub const FAUCET_POLL_SECS: u64 = 60;
pub const COUNTDOWN_TICK_SECS: u64 = 1;
