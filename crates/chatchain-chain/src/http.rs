//! JSON-RPC over HTTP.
//!
//! Used against nodes that hold unlocked accounts (local dev chains), where
//! `eth_sendTransaction` is signed by the node itself. Account-change
//! notifications have no transport here; the host pushes them with
//! [`HttpProvider::notify_accounts_changed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::WalletProvider;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
    listeners: Mutex<Vec<mpsc::UnboundedSender<Vec<Address>>>>,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an `accountsChanged` notification to every live subscriber.
    pub fn notify_accounts_changed(&self, accounts: Vec<Address>) {
        let Ok(mut listeners) = self.listeners.lock() else {
            warn!("Listener registry poisoned, dropping accountsChanged");
            return;
        };
        listeners.retain(|tx| tx.send(accounts.clone()).is_ok());
        debug!(subscribers = listeners.len(), "accountsChanged delivered");
    }
}

impl WalletProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("{method}: HTTP {status}")));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(err) = body.error {
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    fn subscribe_accounts(&self) -> mpsc::UnboundedReceiver<Vec<Address>> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(tx),
            Err(_) => warn!("Listener registry poisoned, subscription will never fire"),
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_prunes_closed_subscribers() {
        let provider = HttpProvider::new("http://127.0.0.1:1");
        let mut live = provider.subscribe_accounts();
        let dropped = provider.subscribe_accounts();
        drop(dropped);

        provider.notify_accounts_changed(vec![Address::repeat_byte(7)]);
        assert_eq!(live.try_recv().unwrap(), vec![Address::repeat_byte(7)]);
        assert_eq!(provider.listeners.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let provider = HttpProvider::new("http://127.0.0.1:1");
        let err = provider.request("eth_blockNumber", json!([])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
