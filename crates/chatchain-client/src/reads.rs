//! Contract views with graceful degradation.
//!
//! Views never fail from the caller's point of view: without a session, or
//! when the node errors, they log and return an empty value. The `refresh_*`
//! calls also write the result into the account snapshot, guarded by the
//! epoch they started under.

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::{debug, warn};

use chatchain_chain::{ChainError, WalletProvider};
use chatchain_shared::types::{Message, UserProfile};
use chatchain_shared::units::TokenAmount;

use crate::session::{read_registration, Session, SessionManager};

pub struct Reads<P> {
    session: Arc<SessionManager<P>>,
}

impl<P> Clone for Reads<P> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

fn degrade<T: Default>(op: &'static str, result: Result<T, ChainError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(op, error = %e, "Read failed, using empty value");
        T::default()
    })
}

impl<P: WalletProvider> Reads<P> {
    pub fn new(session: Arc<SessionManager<P>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager<P>> {
        &self.session
    }

    fn live(&self, op: &'static str) -> Option<Arc<Session<P>>> {
        let session = self.session.current();
        if session.is_none() {
            debug!(op, "No session, skipping read");
        }
        session
    }

    /// The registered profile at `address`, `None` for unknown addresses.
    pub async fn get_user_by_address(&self, address: Address) -> Option<UserProfile> {
        let s = self.live("getUserByAddress")?;
        let result = s.chat().get_user_by_address(address).await.map(Some);
        degrade("getUserByAddress", result).filter(|p| p.exists)
    }

    pub async fn get_all_users(&self) -> Vec<UserProfile> {
        let Some(s) = self.live("getAllUsers") else {
            return Vec::new();
        };
        degrade("getAllUsers", s.chat().get_all_users().await)
    }

    /// Friends of the session account.
    pub async fn get_friends(&self) -> Vec<UserProfile> {
        let Some(s) = self.live("getFriends") else {
            return Vec::new();
        };
        degrade("getFriends", s.chat().get_friends().await)
    }

    /// Conversation between the session account and `peer`, in contract order.
    pub async fn get_messages(&self, peer: Address) -> Vec<Message> {
        let Some(s) = self.live("getMessages") else {
            return Vec::new();
        };
        degrade("getMessages", s.chat().get_messages(peer).await)
    }

    pub async fn get_token_balance(&self, address: Address) -> TokenAmount {
        let Some(s) = self.live("balanceOf") else {
            return TokenAmount::ZERO;
        };
        degrade("balanceOf", s.token().balance_of(address).await)
    }

    /// Faucet cooldown of `address`, in seconds.
    pub async fn get_cooldown_remaining(&self, address: Address) -> u64 {
        let Some(s) = self.live("getCooldownRemaining") else {
            return 0;
        };
        degrade(
            "getCooldownRemaining",
            s.token().cooldown_remaining_of(address).await,
        )
    }

    pub async fn is_registered(&self, address: Address) -> bool {
        let Some(s) = self.live("isRegistered") else {
            return false;
        };
        degrade("isRegistered", s.chat().is_registered(address).await)
    }

    // -----------------------------------------------------------------------
    // Snapshot refreshes
    // -----------------------------------------------------------------------

    /// Re-read the session balance. `None` if the read failed or the session
    /// changed while it was in flight.
    pub async fn refresh_balance(&self) -> Option<TokenAmount> {
        let s = self.live("refreshBalance")?;
        match s.token().balance_of(s.account()).await {
            Ok(balance) => self.session.update_snapshot(s.epoch(), |snap| {
                snap.balance = balance;
                balance
            }),
            Err(e) => {
                warn!(account = %s.account(), error = %e, "Balance refresh failed");
                None
            }
        }
    }

    /// Re-read the cooldown and reset the local countdown to it.
    pub async fn refresh_cooldown(&self) -> Option<u64> {
        let s = self.live("refreshCooldown")?;
        match s.token().cooldown_remaining().await {
            Ok(secs) => self.session.update_snapshot(s.epoch(), |snap| {
                snap.cooldown.reset(secs);
                secs
            }),
            Err(e) => {
                warn!(account = %s.account(), error = %e, "Cooldown refresh failed");
                None
            }
        }
    }

    /// Re-read registration and profile of the session account.
    pub async fn refresh_user_data(&self) -> Option<bool> {
        let s = self.live("refreshUserData")?;
        match read_registration(&s).await {
            Ok((registered, profile)) => self.session.update_snapshot(s.epoch(), |snap| {
                snap.registered = registered;
                snap.profile = profile;
                registered
            }),
            Err(e) => {
                warn!(account = %s.account(), error = %e, "User data refresh failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use chatchain_chain::contracts::{IChatContract, IChatToken};
    use chatchain_chain::ProviderError;
    use chatchain_shared::types::parse_address;

    #[tokio::test]
    async fn test_reads_without_session_are_empty() {
        let wallet = registered_wallet(alice(), "alice", "5");
        let reads = Reads::new(Arc::new(manager(&wallet)));

        assert!(reads.get_all_users().await.is_empty());
        assert!(reads.get_friends().await.is_empty());
        assert_eq!(reads.get_token_balance(alice()).await, TokenAmount::ZERO);
        assert!(reads.refresh_balance().await.is_none());
        assert!(wallet.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reads_degrade() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        let reads = Reads::new(manager);
        wallet.fail_call::<IChatContract::getFriendsCall>(ProviderError::Transport("down".into()));
        wallet.fail_call::<IChatToken::balanceOfCall>(ProviderError::rpc(-32000, "boom"));

        assert!(reads.get_friends().await.is_empty());
        assert_eq!(reads.get_token_balance(alice()).await, TokenAmount::ZERO);
        assert!(reads.refresh_balance().await.is_none());
        assert_eq!(reads.session().snapshot().balance, amount("5"));
    }

    #[tokio::test]
    async fn test_user_lookup_agrees_with_directory() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        stub_users(&wallet, &[(alice(), "alice"), (bob(), "bob"), (carol(), "carol")]);
        let reads = Reads::new(manager);

        let all = reads.get_all_users().await;
        assert_eq!(all.len(), 3);
        for user in &all {
            assert_eq!(reads.get_user_by_address(user.address).await.as_ref(), Some(user));
        }
        assert!(reads.get_user_by_address(dave()).await.is_none());
        assert!(!reads.is_registered(dave()).await);
    }

    #[tokio::test]
    async fn test_lookup_ignores_address_case() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        stub_users(&wallet, &[(alice(), "alice"), (bob(), "bob")]);
        let reads = Reads::new(manager);

        let upper = parse_address(&bob().to_string().to_uppercase().replacen("0X", "0x", 1)).unwrap();
        let lower = parse_address(&bob().to_string().to_lowercase()).unwrap();
        assert_eq!(
            reads.get_user_by_address(upper).await,
            reads.get_user_by_address(lower).await
        );
        assert!(reads.is_registered(upper).await);
    }

    #[tokio::test]
    async fn test_refresh_commits_to_snapshot() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        let reads = Reads::new(manager.clone());

        stub_balances(&wallet, &[(alice(), "7.5")]);
        stub_cooldown(&wallet, 3600);
        assert_eq!(reads.refresh_balance().await, Some(amount("7.5")));
        assert_eq!(reads.refresh_cooldown().await, Some(3600));

        let snap = manager.snapshot();
        assert_eq!(snap.balance, amount("7.5"));
        assert_eq!(snap.cooldown.remaining(), 3600);
    }

    #[tokio::test]
    async fn test_refresh_user_data_after_registration() {
        let wallet = bare_wallet(alice());
        let manager = Arc::new(manager(&wallet));
        manager.connect().await.unwrap();
        assert!(!manager.status().registered());

        stub_users(&wallet, &[(alice(), "alice")]);
        let reads = Reads::new(manager.clone());
        assert_eq!(reads.refresh_user_data().await, Some(true));
        assert!(manager.status().registered());
        assert_eq!(manager.snapshot().profile.unwrap().name, "alice");
    }

    #[tokio::test]
    async fn test_refresh_racing_disconnect_is_discarded() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        let reads = Reads::new(manager.clone());
        stub_balances(&wallet, &[(alice(), "99")]);
        let before = wallet.call_count::<IChatToken::balanceOfCall>();
        let gate = wallet.hold_call::<IChatToken::balanceOfCall>();

        let refresh = {
            let reads = reads.clone();
            tokio::spawn(async move { reads.refresh_balance().await })
        };
        while wallet.call_count::<IChatToken::balanceOfCall>() == before {
            tokio::task::yield_now().await;
        }

        manager.on_accounts_changed(vec![]).await;
        gate.notify_one();

        assert_eq!(refresh.await.unwrap(), None);
        assert_eq!(manager.snapshot().balance, TokenAmount::ZERO);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_cooldown_of_other_account() {
        let (wallet, manager) = connected(alice(), "alice", "5").await;
        stub_cooldown(&wallet, 42);
        let reads = Reads::new(manager);

        assert_eq!(reads.get_cooldown_remaining(bob()).await, 42);
        let senders = wallet.call_senders::<IChatToken::getCooldownRemainingCall>();
        assert_eq!(senders.last(), Some(&Some(bob())));
    }
}
