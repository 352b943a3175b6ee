//! Typed JSON-RPC calls on top of a [`WalletProvider`].

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::codec;
use crate::error::ProviderError;
use crate::provider::WalletProvider;

/// Transaction receipt, reduced to what confirmation needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_deref(), Some("0x1") | Some("0x01"))
    }
}

/// A raw log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<String>,
}

impl RpcLog {
    pub fn block(&self) -> Option<u64> {
        self.block_number
            .as_deref()
            .and_then(|n| codec::parse_quantity(n).ok())
    }

    pub fn index(&self) -> u64 {
        self.log_index
            .as_deref()
            .and_then(|n| codec::parse_quantity(n).ok())
            .unwrap_or_default()
    }
}

/// Filter for `eth_getLogs`. `None` topics are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub from_block: u64,
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    pub fn to_json(&self) -> Value {
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|t| match t {
                Some(word) => Value::String(word.to_string()),
                None => Value::Null,
            })
            .collect();
        json!({
            "address": self.address.to_string(),
            "fromBlock": codec::to_quantity(self.from_block),
            "toBlock": "latest",
            "topics": topics,
        })
    }
}

/// Cheap-to-clone handle to a provider with typed helpers.
pub struct Rpc<P> {
    provider: Arc<P>,
}

impl<P> Clone for Rpc<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P: WalletProvider> Rpc<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Prompt the wallet for account access.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.provider.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(value)
    }

    /// Accounts already authorised, without prompting.
    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.provider.request("eth_accounts", json!([])).await?;
        parse_accounts(value)
    }

    pub async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        let mut tx = json!({
            "to": to.to_string(),
            "data": codec::to_hex_bytes(data),
        });
        if let Some(from) = from {
            tx["from"] = Value::String(from.to_string());
        }
        let value = self.provider.request("eth_call", json!([tx, "latest"])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse("eth_call returned non-string result".into()))?;
        codec::parse_hex_bytes(hex)
    }

    /// Sign and broadcast through the wallet. Returns the transaction hash.
    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<B256, ProviderError> {
        let tx = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": codec::to_hex_bytes(data),
        });
        let value = self.provider.request("eth_sendTransaction", json!([tx])).await?;
        let hash: B256 = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad transaction hash: {e}")))?;
        debug!(tx = %hash, to = %to, "Transaction submitted");
        Ok(hash)
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, ProviderError> {
        let value = self
            .provider
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad receipt: {e}")))
    }

    /// Poll until the transaction is included. Waits as long as it takes;
    /// callers abandon the wait by dropping the future.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        poll_interval: Duration,
    ) -> Result<Receipt, ProviderError> {
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                debug!(tx = %hash, success = receipt.is_success(), "Transaction included");
                return Ok(receipt);
            }
            trace!(tx = %hash, "Receipt not available yet");
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn block_number(&self) -> Result<u64, ProviderError> {
        let value = self.provider.request("eth_blockNumber", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse("eth_blockNumber returned non-string".into()))?;
        codec::parse_quantity(hex)
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<u64, ProviderError> {
        let value = self
            .provider
            .request(
                "eth_getBlockByNumber",
                json!([codec::to_quantity(number), false]),
            )
            .await?;
        let ts = value
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("block {number} has no timestamp")))?;
        codec::parse_quantity(ts)
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, ProviderError> {
        let value = self
            .provider
            .request("eth_getLogs", json!([filter.to_json()]))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad log list: {e}")))
    }
}

fn parse_accounts(value: Value) -> Result<Vec<Address>, ProviderError> {
    let raw: Vec<String> = serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad account list: {e}")))?;
    raw.iter()
        .map(|s| {
            chatchain_shared::types::parse_address(s)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("bad account {s:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_json() {
        let filter = LogFilter {
            address: Address::repeat_byte(0x11),
            from_block: 16,
            topics: vec![Some(B256::repeat_byte(0xaa)), None, Some(B256::repeat_byte(0xbb))],
        };
        let v = filter.to_json();
        assert_eq!(v["fromBlock"], "0x10");
        assert_eq!(v["toBlock"], "latest");
        assert!(v["topics"][1].is_null());
        assert_eq!(v["topics"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_receipt_status() {
        let ok: Receipt = serde_json::from_value(json!({
            "transactionHash": B256::ZERO.to_string(),
            "status": "0x1",
        }))
        .unwrap();
        assert!(ok.is_success());

        let failed: Receipt = serde_json::from_value(json!({
            "transactionHash": B256::ZERO.to_string(),
            "status": "0x0",
        }))
        .unwrap();
        assert!(!failed.is_success());
    }

    #[test]
    fn test_parse_accounts_mixed_case() {
        let accounts = parse_accounts(json!([
            "0xABCDEF0000000000000000000000000000000001",
            "0xabcdef0000000000000000000000000000000002",
        ]))
        .unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(parse_accounts(json!(["nope"])).is_err());
    }
}
