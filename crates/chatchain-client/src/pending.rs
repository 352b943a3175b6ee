//! Messages waiting from users who are not friends yet.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Serialize;

use chatchain_chain::WalletProvider;
use chatchain_shared::types::UserProfile;

use crate::reads::Reads;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConversation {
    pub user: UserProfile,
    /// Messages in the conversation that this user sent.
    pub count: usize,
}

/// Every registered non-friend who has written to the session account.
pub async fn scan_pending<P: WalletProvider>(reads: &Reads<P>) -> Vec<PendingConversation> {
    let Some(session) = reads.session().current() else {
        return Vec::new();
    };
    let me = session.account();

    let (users, friends) = tokio::join!(reads.get_all_users(), reads.get_friends());
    let friends: HashSet<_> = friends.iter().map(|f| f.address).collect();
    let strangers: Vec<UserProfile> = users
        .into_iter()
        .filter(|u| u.address != me && !friends.contains(&u.address))
        .collect();

    let conversations = join_all(strangers.iter().map(|u| reads.get_messages(u.address))).await;

    let pending: Vec<PendingConversation> = strangers
        .into_iter()
        .zip(conversations)
        .filter_map(|(user, messages)| {
            let count = messages.iter().filter(|m| m.is_from(user.address)).count();
            (count > 0).then_some(PendingConversation { user, count })
        })
        .collect();
    tracing::debug!(count = pending.len(), "Pending conversations scanned");
    pending
}
