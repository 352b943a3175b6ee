//! In-memory wallet provider for tests.
//!
//! Views are answered by per-selector handlers, writes are recorded and
//! "mined" immediately, logs are served from filter rules. Every request is
//! recorded so tests can assert on exactly which calls were made.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use crate::codec;
use crate::error::ProviderError;
use crate::provider::WalletProvider;
use crate::rpc::RpcLog;

type CallHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, ProviderError> + Send + Sync>;

/// A transaction the code under test asked the wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub from: Address,
    pub to: Address,
    pub selector: [u8; 4],
    pub data: Vec<u8>,
    pub hash: B256,
}

impl SentTransaction {
    pub fn is<C: SolCall>(&self) -> bool {
        self.selector == C::SELECTOR
    }

    pub fn decode<C: SolCall>(&self) -> Option<C> {
        C::abi_decode(&self.data).ok()
    }
}

struct LogRule {
    topics: Vec<Option<B256>>,
    result: Result<Vec<RpcLog>, ProviderError>,
}

#[derive(Default)]
struct State {
    request_accounts: Option<Result<Vec<Address>, ProviderError>>,
    accounts: Vec<Address>,
    calls: HashMap<[u8; 4], CallHandler>,
    call_log: Vec<([u8; 4], Option<Address>)>,
    gates: HashMap<[u8; 4], Arc<Notify>>,
    submit_errors: HashMap<[u8; 4], ProviderError>,
    reverting: HashSet<[u8; 4]>,
    sent: Vec<SentTransaction>,
    receipts: HashMap<B256, bool>,
    block_number: Option<Result<u64, ProviderError>>,
    block_timestamps: HashMap<u64, u64>,
    logs: Vec<LogRule>,
    requests: Vec<String>,
    listeners: Vec<mpsc::UnboundedSender<Vec<Address>>>,
}

#[derive(Default)]
pub struct MockWallet {
    state: Mutex<State>,
    next_tx: AtomicU64,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet that grants access to `account` without prompting.
    pub fn with_account(account: Address) -> Self {
        let wallet = Self::new();
        {
            let mut st = wallet.state();
            st.accounts = vec![account];
            st.request_accounts = Some(Ok(vec![account]));
        }
        wallet
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_request_accounts(&self, result: Result<Vec<Address>, ProviderError>) {
        self.state().request_accounts = Some(result);
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state().accounts = accounts;
    }

    /// Answer every `C` view with `ret`.
    pub fn on_call<C: SolCall>(&self, ret: C::Return) {
        let bytes = C::abi_encode_returns(&ret);
        self.state()
            .calls
            .insert(C::SELECTOR, Arc::new(move |_| Ok(bytes.clone())));
    }

    /// Answer `C` views with a function of the decoded arguments.
    pub fn on_call_with<C, F>(&self, f: F)
    where
        C: SolCall + 'static,
        F: Fn(C) -> C::Return + Send + Sync + 'static,
    {
        let handler: CallHandler = Arc::new(move |data: &[u8]| {
            let call = C::abi_decode(data)
                .map_err(|e| ProviderError::rpc(-32602, format!("bad calldata: {e}")))?;
            Ok(C::abi_encode_returns(&f(call)))
        });
        self.state().calls.insert(C::SELECTOR, handler);
    }

    pub fn fail_call<C: SolCall>(&self, err: ProviderError) {
        self.state()
            .calls
            .insert(C::SELECTOR, Arc::new(move |_| Err(err.clone())));
    }

    /// Hold the next `C` view until the returned notify is signalled.
    pub fn hold_call<C: SolCall>(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().gates.insert(C::SELECTOR, gate.clone());
        gate
    }

    /// Make the wallet refuse to submit `C`.
    pub fn fail_submit<C: SolCall>(&self, err: ProviderError) {
        self.state().submit_errors.insert(C::SELECTOR, err);
    }

    /// Mine `C` transactions with a failed status.
    pub fn revert_on_chain<C: SolCall>(&self) {
        self.state().reverting.insert(C::SELECTOR);
    }

    pub fn set_block_number(&self, n: u64) {
        self.state().block_number = Some(Ok(n));
    }

    pub fn fail_block_number(&self, err: ProviderError) {
        self.state().block_number = Some(Err(err));
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.state().block_timestamps.insert(block, timestamp);
    }

    pub fn on_logs(&self, topics: Vec<Option<B256>>, logs: Vec<RpcLog>) {
        self.state().logs.push(LogRule {
            topics,
            result: Ok(logs),
        });
    }

    pub fn fail_logs(&self, topics: Vec<Option<B256>>, err: ProviderError) {
        self.state().logs.push(LogRule {
            topics,
            result: Err(err),
        });
    }

    /// Fire an `accountsChanged` notification.
    pub fn push_accounts(&self, accounts: Vec<Address>) {
        let mut st = self.state();
        st.accounts = accounts.clone();
        st.listeners.retain(|tx| tx.send(accounts.clone()).is_ok());
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }

    pub fn sent_count<C: SolCall>(&self) -> usize {
        self.state().sent.iter().filter(|t| t.is::<C>()).count()
    }

    pub fn call_count<C: SolCall>(&self) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|(sel, _)| *sel == C::SELECTOR)
            .count()
    }

    /// `from` of every recorded `C` view.
    pub fn call_senders<C: SolCall>(&self) -> Vec<Option<Address>> {
        self.state()
            .call_log
            .iter()
            .filter(|(sel, _)| *sel == C::SELECTOR)
            .map(|(_, from)| *from)
            .collect()
    }

    /// Method names of every request, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// Build a log entry for [`MockWallet::on_logs`].
    pub fn log(
        address: Address,
        topics: Vec<B256>,
        data: Vec<u8>,
        block: u64,
        tx_hash: B256,
        log_index: u64,
    ) -> RpcLog {
        RpcLog {
            address,
            topics,
            data: Bytes::from(data),
            block_number: Some(codec::to_quantity(block)),
            transaction_hash: Some(tx_hash),
            log_index: Some(codec::to_quantity(log_index)),
        }
    }

    fn handle_call(&self, params: &Value) -> Result<([u8; 4], Option<Arc<Notify>>), ProviderError> {
        let tx = params.get(0).ok_or_else(|| ProviderError::rpc(-32602, "missing call object"))?;
        let data = tx
            .get("data")
            .and_then(Value::as_str)
            .map(codec::parse_hex_bytes)
            .transpose()?
            .unwrap_or_default();
        if data.len() < 4 {
            return Err(ProviderError::rpc(-32602, "calldata shorter than a selector"));
        }
        let selector = [data[0], data[1], data[2], data[3]];
        let from = tx
            .get("from")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Address>().ok());

        let mut st = self.state();
        st.call_log.push((selector, from));
        let gate = st.gates.remove(&selector);
        Ok((selector, gate))
    }

    fn answer_call(&self, selector: [u8; 4], params: &Value) -> Result<Value, ProviderError> {
        let data = params
            .get(0)
            .and_then(|tx| tx.get("data"))
            .and_then(Value::as_str)
            .map(codec::parse_hex_bytes)
            .transpose()?
            .unwrap_or_default();
        let handler = self.state().calls.get(&selector).cloned();
        match handler {
            Some(h) => h(&data).map(|out| Value::String(codec::to_hex_bytes(&out))),
            None => Err(ProviderError::rpc(
                -32000,
                format!("no mock for selector 0x{}", hex::encode(selector)),
            )),
        }
    }

    fn handle_send(&self, params: &Value) -> Result<Value, ProviderError> {
        let tx = params.get(0).ok_or_else(|| ProviderError::rpc(-32602, "missing tx object"))?;
        let field = |name: &str| -> Result<Address, ProviderError> {
            tx.get(name)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Address>().ok())
                .ok_or_else(|| ProviderError::rpc(-32602, format!("missing {name}")))
        };
        let from = field("from")?;
        let to = field("to")?;
        let data = codec::parse_hex_bytes(tx.get("data").and_then(Value::as_str).unwrap_or("0x"))?;
        if data.len() < 4 {
            return Err(ProviderError::rpc(-32602, "calldata shorter than a selector"));
        }
        let selector = [data[0], data[1], data[2], data[3]];

        let mut st = self.state();
        if let Some(err) = st.submit_errors.get(&selector) {
            return Err(err.clone());
        }
        let n = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        let hash = B256::left_padding_from(&n.to_be_bytes());
        let success = !st.reverting.contains(&selector);
        st.receipts.insert(hash, success);
        st.sent.push(SentTransaction {
            from,
            to,
            selector,
            data,
            hash,
        });
        Ok(Value::String(hash.to_string()))
    }

    fn handle_receipt(&self, params: &Value) -> Result<Value, ProviderError> {
        let hash: B256 = params
            .get(0)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::rpc(-32602, "bad hash"))?;
        let st = self.state();
        Ok(match st.receipts.get(&hash) {
            Some(success) => json!({
                "transactionHash": hash.to_string(),
                "status": if *success { "0x1" } else { "0x0" },
                "blockNumber": "0x1",
            }),
            None => Value::Null,
        })
    }

    fn handle_logs(&self, params: &Value) -> Result<Value, ProviderError> {
        let topics: Vec<Option<B256>> = params
            .get(0)
            .and_then(|f| f.get("topics"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|t| t.as_str().and_then(|s| s.parse::<B256>().ok()))
                    .collect()
            })
            .unwrap_or_default();
        let st = self.state();
        match st.logs.iter().find(|rule| rule.topics == topics) {
            Some(LogRule { result: Ok(logs), .. }) => serde_json::to_value(logs)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string())),
            Some(LogRule { result: Err(e), .. }) => Err(e.clone()),
            None => Ok(json!([])),
        }
    }

    fn handle_block(&self, params: &Value) -> Result<Value, ProviderError> {
        let number = params
            .get(0)
            .and_then(Value::as_str)
            .map(codec::parse_quantity)
            .transpose()?
            .unwrap_or_default();
        let st = self.state();
        match st.block_timestamps.get(&number) {
            Some(ts) => Ok(json!({
                "number": codec::to_quantity(number),
                "timestamp": codec::to_quantity(*ts),
            })),
            None => Err(ProviderError::rpc(-32000, format!("block {number} not found"))),
        }
    }
}

impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.state().requests.push(method.to_string());

        match method {
            "eth_requestAccounts" => {
                let st = self.state();
                let result = st
                    .request_accounts
                    .clone()
                    .unwrap_or_else(|| Ok(st.accounts.clone()))?;
                Ok(json!(result.iter().map(|a| a.to_string()).collect::<Vec<_>>()))
            }
            "eth_accounts" => {
                let st = self.state();
                Ok(json!(st.accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>()))
            }
            "eth_call" => {
                let (selector, gate) = self.handle_call(&params)?;
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                self.answer_call(selector, &params)
            }
            "eth_sendTransaction" => self.handle_send(&params),
            "eth_getTransactionReceipt" => self.handle_receipt(&params),
            "eth_blockNumber" => {
                let st = self.state();
                let n = st.block_number.clone().unwrap_or(Ok(0))?;
                Ok(Value::String(codec::to_quantity(n)))
            }
            "eth_getBlockByNumber" => self.handle_block(&params),
            "eth_getLogs" => self.handle_logs(&params),
            other => Err(ProviderError::rpc(-32601, format!("method {other} not mocked"))),
        }
    }

    fn subscribe_accounts(&self) -> mpsc::UnboundedReceiver<Vec<Address>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().listeners.push(tx);
        rx
    }
}
