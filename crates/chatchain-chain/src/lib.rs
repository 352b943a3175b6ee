// Chain access layer: the wallet provider boundary, JSON-RPC helpers and
// typed handles for the chat and token contracts.

pub mod codec;
pub mod contracts;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
pub mod rpc;

pub use contracts::{ChatContract, TokenContract};
pub use error::{ChainError, ProviderError};
pub use http::HttpProvider;
pub use provider::WalletProvider;
pub use rpc::{LogFilter, Receipt, Rpc, RpcLog};
