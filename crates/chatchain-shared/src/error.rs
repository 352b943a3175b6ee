use std::fmt;

use alloy_primitives::B256;
use serde::Serialize;
use thiserror::Error;

/// Failures while establishing a wallet session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("No wallet provider detected")]
    NoWallet,

    #[error("Wallet access request was rejected")]
    UserRejected,

    #[error("Network error: {0}")]
    Network(String),
}

/// Which balance fell short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FundsKind {
    /// CHAT tokens (message fee or transfer amount).
    Token,
    /// Native currency for gas.
    Gas,
}

/// Error taxonomy of every on-chain write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("No wallet session")]
    NotConnected,

    #[error("Transaction was rejected in the wallet")]
    UserRejected,

    #[error("Insufficient funds ({0:?})")]
    InsufficientFunds(FundsKind),

    #[error("Contract reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    ContractReverted { reason: Option<String> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Recipient is not a friend")]
    NotFriends,

    #[error("Faucet cooldown active ({remaining_secs}s remaining)")]
    CooldownActive { remaining_secs: u64 },
}

impl WriteError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// The phase of a write in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteStep {
    Validate,
    CheckFriendship,
    CheckBalance,
    CheckAllowance,
    CheckCooldown,
    Approve,
    Submit,
    Confirm,
    ReadBack,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteStep::Validate => "validate",
            WriteStep::CheckFriendship => "check-friendship",
            WriteStep::CheckBalance => "check-balance",
            WriteStep::CheckAllowance => "check-allowance",
            WriteStep::CheckCooldown => "check-cooldown",
            WriteStep::Approve => "approve",
            WriteStep::Submit => "submit",
            WriteStep::Confirm => "confirm",
            WriteStep::ReadBack => "read-back",
        };
        f.write_str(s)
    }
}

/// A write that did not complete. Nothing should be assumed to have happened
/// on-chain unless the final step confirmed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (at {step})")]
pub struct WriteFailure {
    pub step: WriteStep,
    pub error: WriteError,
    /// Set when the transaction was already broadcast: it may still be mined.
    pub tx_hash: Option<B256>,
}

impl WriteFailure {
    pub fn new(step: WriteStep, error: WriteError) -> Self {
        Self {
            step,
            error,
            tx_hash: None,
        }
    }

    pub fn with_tx(mut self, hash: B256) -> Self {
        self.tx_hash = Some(hash);
        self
    }

    /// Notification text for this failure. Each category gets its own text;
    /// undetermined network failures share one generic message.
    pub fn user_message(&self) -> String {
        match &self.error {
            WriteError::NotConnected if self.tx_hash.is_some() => {
                "Account changed while a transaction was pending. Check your wallet activity.".into()
            }
            WriteError::NotConnected => "Connect your wallet first.".into(),
            WriteError::UserRejected => "Transaction was rejected.".into(),
            WriteError::InsufficientFunds(FundsKind::Token) => "Insufficient tokens.".into(),
            WriteError::InsufficientFunds(FundsKind::Gas) => "Insufficient funds for gas.".into(),
            WriteError::ContractReverted { reason: Some(r) } => format!("Transaction failed: {r}"),
            WriteError::ContractReverted { reason: None } => "Transaction failed.".into(),
            WriteError::Network(_) => "Something went wrong. Please try again.".into(),
            WriteError::Validation { field, reason } => format!("Invalid {field}: {reason}"),
            WriteError::NotFriends => "You can only send tokens to friends.".into(),
            WriteError::CooldownActive { .. } => "Cooldown active, try again later.".into(),
        }
    }
}

pub type WriteResult<T> = std::result::Result<T, WriteFailure>;
