//! Fixtures shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};

use chatchain_chain::contracts::{ChatMessage, ChatUser, IChatContract, IChatToken};
use chatchain_chain::mock::MockWallet;
use chatchain_shared::types::UserProfile;
use chatchain_shared::units::TokenAmount;

use crate::config::ClientConfig;
use crate::session::SessionManager;

pub fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn carol() -> Address {
    Address::repeat_byte(0xc4)
}

pub fn dave() -> Address {
    Address::repeat_byte(0xd7)
}

pub fn amount(s: &str) -> TokenAmount {
    TokenAmount::parse(s).unwrap()
}

pub fn profile(address: Address, name: &str) -> UserProfile {
    UserProfile {
        name: name.to_string(),
        address,
        exists: true,
    }
}

pub fn chat_user(address: Address, name: &str) -> ChatUser {
    ChatUser {
        name: name.to_string(),
        userAddress: address,
        exists: true,
    }
}

pub fn chat_message(sender: Address, receiver: Address, content: &str, ts: u64) -> ChatMessage {
    ChatMessage {
        sender,
        receiver,
        content: content.to_string(),
        timestamp: U256::from(ts),
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        chat_contract: Address::repeat_byte(0xcc),
        token_contract: Address::repeat_byte(0x70),
        receipt_poll_interval: Duration::from_millis(1),
        ..ClientConfig::default()
    }
}

pub fn manager(wallet: &Arc<MockWallet>) -> SessionManager<MockWallet> {
    SessionManager::with_provider(wallet.clone(), test_config())
}

/// Registry views answer from `users`; unknown addresses are unregistered.
pub fn stub_users(wallet: &MockWallet, users: &[(Address, &str)]) {
    let users: Vec<ChatUser> = users.iter().map(|(a, n)| chat_user(*a, n)).collect();

    let registry = users.clone();
    wallet.on_call_with::<IChatContract::isRegisteredCall, _>(move |call| {
        registry.iter().any(|u| u.userAddress == call.user)
    });

    let registry = users.clone();
    wallet.on_call_with::<IChatContract::getUserByAddressCall, _>(move |call| {
        registry
            .iter()
            .find(|u| u.userAddress == call.user)
            .cloned()
            .unwrap_or(ChatUser {
                name: String::new(),
                userAddress: Address::ZERO,
                exists: false,
            })
    });

    wallet.on_call::<IChatContract::getAllUsersCall>(users);
}

pub fn stub_balances(wallet: &MockWallet, balances: &[(Address, &str)]) {
    let balances: HashMap<Address, U256> = balances
        .iter()
        .map(|(a, b)| (*a, amount(b).base_units()))
        .collect();
    wallet.on_call_with::<IChatToken::balanceOfCall, _>(move |call| {
        balances.get(&call.account).copied().unwrap_or_default()
    });
}

pub fn stub_allowance(wallet: &MockWallet, allowance: &str) {
    wallet.on_call::<IChatToken::allowanceCall>(amount(allowance).base_units());
}

pub fn stub_cooldown(wallet: &MockWallet, secs: u64) {
    wallet.on_call::<IChatToken::getCooldownRemainingCall>(U256::from(secs));
}

/// Wallet for `account`, unregistered, no tokens, no cooldown.
pub fn bare_wallet(account: Address) -> Arc<MockWallet> {
    let wallet = Arc::new(MockWallet::with_account(account));
    stub_users(&wallet, &[]);
    stub_balances(&wallet, &[]);
    stub_cooldown(&wallet, 0);
    wallet
}

/// Wallet for a registered `account` holding `balance` tokens.
pub fn registered_wallet(account: Address, name: &str, balance: &str) -> Arc<MockWallet> {
    let wallet = Arc::new(MockWallet::with_account(account));
    stub_users(&wallet, &[(account, name)]);
    stub_balances(&wallet, &[(account, balance)]);
    stub_cooldown(&wallet, 0);
    wallet
}

/// Connected manager for a registered `account`.
pub async fn connected(
    account: Address,
    name: &str,
    balance: &str,
) -> (Arc<MockWallet>, Arc<SessionManager<MockWallet>>) {
    let wallet = registered_wallet(account, name, balance);
    let manager = Arc::new(manager(&wallet));
    manager.connect().await.unwrap();
    (wallet, manager)
}
