use alloy_primitives::{Address, B256};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SYSTEM_MESSAGE_PREFIX;
use crate::units::TokenAmount;

/// Parse a textual address, accepting any letter case.
pub fn parse_address(s: &str) -> Option<Address> {
    let lowered = s.trim().to_ascii_lowercase();
    lowered.parse::<Address>().ok()
}

/// `0x1234…abcd` form of an address.
pub fn short_address(address: &Address) -> String {
    let hex = address.to_string();
    format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
}

/// A registered user as returned by the chat contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub address: Address,
    pub exists: bool,
}

impl UserProfile {
    pub fn short_address(&self) -> String {
        short_address(&self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Text written by a user.
    User,
    /// Notice generated by the contract (token transfer side effects).
    System,
}

/// One entry of a conversation, in contract return order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Address,
    pub receiver: Address,
    pub content: String,
    pub timestamp_secs: u64,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        if self.content.starts_with(SYSTEM_MESSAGE_PREFIX) {
            MessageKind::System
        } else {
            MessageKind::User
        }
    }

    /// Content as it should be shown: system notices lose their marker.
    pub fn display_text(&self) -> &str {
        match self.kind() {
            MessageKind::System => self.content[SYSTEM_MESSAGE_PREFIX.len()..].trim_start(),
            MessageKind::User => &self.content,
        }
    }

    pub fn is_from(&self, address: Address) -> bool {
        self.sender == address
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp_secs as i64, 0).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    TokenSent,
    TokenReceived,
    MessageSent,
    TokenRequested,
    FriendAdded,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::TokenSent,
        TransactionKind::TokenReceived,
        TransactionKind::TokenRequested,
        TransactionKind::MessageSent,
        TransactionKind::FriendAdded,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::TokenSent => "Tokens sent",
            TransactionKind::TokenReceived => "Tokens received",
            TransactionKind::MessageSent => "Message sent",
            TransactionKind::TokenRequested => "Tokens requested",
            TransactionKind::FriendAdded => "Friend added",
        }
    }
}

/// One line of the activity feed, synthesized from an event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub amount: Option<TokenAmount>,
    pub timestamp_secs: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Public view of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected { registered: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> Message {
        Message {
            sender: Address::repeat_byte(1),
            receiver: Address::repeat_byte(2),
            content: content.to_string(),
            timestamp_secs: 1_700_000_000,
        }
    }

    #[test]
    fn test_parse_address_any_case() {
        let upper = parse_address("0xABCDEF0000000000000000000000000000000001").unwrap();
        let lower = parse_address("0xabcdef0000000000000000000000000000000001").unwrap();
        assert_eq!(upper, lower);
        assert!(parse_address("not-an-address").is_none());
    }

    #[test]
    fn test_system_message_kind() {
        let m = msg("SYSTEM: Sent 5 CHAT tokens");
        assert_eq!(m.kind(), MessageKind::System);
        assert_eq!(m.display_text(), "Sent 5 CHAT tokens");

        let m = msg("hello SYSTEM:");
        assert_eq!(m.kind(), MessageKind::User);
        assert_eq!(m.display_text(), "hello SYSTEM:");
    }

    #[test]
    fn test_sent_at() {
        let m = msg("hi");
        assert_eq!(m.sent_at().unwrap().timestamp(), 1_700_000_000);
    }
}
