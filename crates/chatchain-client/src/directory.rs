//! User directory views: who is a friend, and names for addresses.

use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use serde::Serialize;

use chatchain_chain::WalletProvider;
use chatchain_shared::types::{short_address, UserProfile};

use crate::reads::Reads;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub profile: UserProfile,
    pub is_friend: bool,
}

/// Every user except `me`, flagged by friendship.
pub fn annotate(all: Vec<UserProfile>, friends: &[UserProfile], me: Address) -> Vec<DirectoryEntry> {
    let friends: HashSet<Address> = friends.iter().map(|f| f.address).collect();
    all.into_iter()
        .filter(|u| u.address != me)
        .map(|profile| DirectoryEntry {
            is_friend: friends.contains(&profile.address),
            profile,
        })
        .collect()
}

pub async fn load_directory<P: WalletProvider>(reads: &Reads<P>) -> Vec<DirectoryEntry> {
    let Some(session) = reads.session().current() else {
        return Vec::new();
    };
    let (all, friends) = tokio::join!(reads.get_all_users(), reads.get_friends());
    annotate(all, &friends, session.account())
}

/// Address to display name lookup.
#[derive(Debug, Clone, Default)]
pub struct NameBook {
    names: HashMap<Address, String>,
}

impl NameBook {
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a UserProfile>) -> Self {
        let names = users
            .into_iter()
            .filter(|u| u.exists)
            .map(|u| (u.address, u.name.clone()))
            .collect();
        Self { names }
    }

    pub fn name_of(&self, address: &Address) -> Option<&str> {
        self.names.get(address).map(String::as_str)
    }

    /// Name if known, otherwise the shortened address.
    pub fn label(&self, address: &Address) -> String {
        match self.name_of(address) {
            Some(name) => name.to_string(),
            None => short_address(address),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use chatchain_chain::contracts::IChatContract;

    #[test]
    fn test_annotate_excludes_self() {
        let all = vec![profile(alice(), "alice"), profile(bob(), "bob"), profile(carol(), "carol")];
        let entries = annotate(all, &[profile(bob(), "bob")], alice());
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.profile.address == bob() && e.is_friend));
        assert!(entries.iter().any(|e| e.profile.address == carol() && !e.is_friend));
    }

    #[test]
    fn test_name_book_labels() {
        let users = [profile(bob(), "bob")];
        let book = NameBook::from_users(&users);
        assert_eq!(book.label(&bob()), "bob");
        let unknown = book.label(&carol());
        assert!(unknown.starts_with("0x"));
        assert!(unknown.contains('…'));
    }

    #[tokio::test]
    async fn test_load_directory() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        stub_users(&wallet, &[(alice(), "alice"), (bob(), "bob"), (carol(), "carol")]);
        wallet.on_call::<IChatContract::getFriendsCall>(vec![chat_user(carol(), "carol")]);

        let entries = load_directory(&Reads::new(manager)).await;
        let friends: Vec<_> = entries.iter().filter(|e| e.is_friend).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].profile.name, "carol");
    }
}
