use alloy_sol_types::{Revert, SolError};
use serde_json::Value;
use thiserror::Error;

use chatchain_shared::error::{ConnectError, FundsKind, WriteError};

use crate::codec;

/// EIP-1193 code for a request the user declined in the wallet.
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC code used by nodes for `execution reverted`.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Errors surfaced by a [`crate::WalletProvider`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The request never got an answer (connection refused, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The answer could not be interpreted.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn user_rejected() -> Self {
        Self::rpc(USER_REJECTED_CODE, "User rejected the request.")
    }

    pub fn is_user_rejected(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message, .. } => {
                let lower = message.to_lowercase();
                *code == USER_REJECTED_CODE
                    || lower.contains("user rejected")
                    || lower.contains("user denied")
            }
            _ => false,
        }
    }

    /// Revert reason, if this error is a revert and a reason can be recovered.
    pub fn revert_reason(&self) -> Option<String> {
        let ProviderError::Rpc { message, data, .. } = self else {
            return None;
        };

        let raw = match data {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Object(obj)) => obj.get("data").and_then(Value::as_str),
            _ => None,
        };
        if let Some(bytes) = raw.and_then(|s| codec::parse_hex_bytes(s).ok()) {
            if let Ok(revert) = Revert::abi_decode(&bytes) {
                return Some(revert.reason);
            }
        }

        const MARKERS: [&str; 2] = ["execution reverted: ", "reverted with reason string "];
        MARKERS.iter().find_map(|marker| {
            message.find(marker).map(|idx| {
                message[idx + marker.len()..]
                    .trim()
                    .trim_matches('\'')
                    .to_string()
            })
        })
    }

    fn is_revert(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message, .. } => {
                *code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// Map onto the write error taxonomy.
    pub fn classify(&self) -> WriteError {
        if self.is_user_rejected() {
            return WriteError::UserRejected;
        }
        if let ProviderError::Rpc { message, .. } = self {
            if message.to_lowercase().contains("insufficient funds") {
                return WriteError::InsufficientFunds(FundsKind::Gas);
            }
        }
        if self.is_revert() {
            return WriteError::ContractReverted {
                reason: self.revert_reason(),
            };
        }
        WriteError::Network(self.to_string())
    }

    /// Map onto the connection error taxonomy.
    pub fn classify_connect(&self) -> ConnectError {
        if self.is_user_rejected() {
            ConnectError::UserRejected
        } else {
            ConnectError::Network(self.to_string())
        }
    }
}

/// Errors from typed contract access.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("ABI decode error: {0}")]
    Decode(#[from] alloy_sol_types::Error),
}

impl ChainError {
    pub fn classify(&self) -> WriteError {
        match self {
            ChainError::Provider(e) => e.classify(),
            ChainError::Decode(e) => WriteError::Network(format!("undecodable response: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_user_rejected() {
        assert_eq!(ProviderError::user_rejected().classify(), WriteError::UserRejected);
        let by_message = ProviderError::rpc(-32603, "MetaMask Tx Signature: User denied transaction signature.");
        assert_eq!(by_message.classify(), WriteError::UserRejected);
    }

    #[test]
    fn test_classify_gas() {
        let e = ProviderError::rpc(-32000, "insufficient funds for gas * price + value");
        assert_eq!(e.classify(), WriteError::InsufficientFunds(FundsKind::Gas));
    }

    #[test]
    fn test_revert_reason_from_data() {
        let data = Revert {
            reason: "Cooldown period not over".to_string(),
        }
        .abi_encode();
        let e = ProviderError::Rpc {
            code: EXECUTION_REVERTED_CODE,
            message: "execution reverted".into(),
            data: Some(Value::String(codec::to_hex_bytes(&data))),
        };
        assert_eq!(
            e.classify(),
            WriteError::ContractReverted {
                reason: Some("Cooldown period not over".into())
            }
        );
    }

    #[test]
    fn test_revert_reason_from_message() {
        let e = ProviderError::rpc(-32603, "execution reverted: Not friends");
        assert_eq!(e.revert_reason().as_deref(), Some("Not friends"));
    }

    #[test]
    fn test_transport_is_network() {
        let e = ProviderError::Transport("connection refused".into());
        assert!(matches!(e.classify(), WriteError::Network(_)));
        assert!(matches!(e.classify_connect(), ConnectError::Network(_)));
    }
}
