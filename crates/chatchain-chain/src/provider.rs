//! The wallet provider boundary.
//!
//! Modelled on EIP-1193: a single `request` entry point plus an
//! account-change notification stream. The notification side is a plain
//! channel so the session layer owns the subscription and tears it down by
//! dropping the receiver (the equivalent of `removeListener`).

use std::future::Future;

use alloy_primitives::Address;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ProviderError;

pub trait WalletProvider: Send + Sync + 'static {
    /// Send one JSON-RPC request through the wallet.
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, ProviderError>> + Send;

    /// Subscribe to `accountsChanged` notifications.
    fn subscribe_accounts(&self) -> mpsc::UnboundedReceiver<Vec<Address>>;
}
