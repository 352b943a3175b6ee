//! Wallet session lifecycle.
//!
//! A [`Session`] is immutable: it is built once per connection epoch and
//! replaced whole when the account changes. Everything derived from the
//! account (registration, profile, balance, cooldown) lives in a separate
//! [`AccountSnapshot`] that only accepts writes tagged with the current
//! epoch, so a slow read started for an old account can never land on the
//! new one.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatchain_chain::{ChainError, ChatContract, Rpc, TokenContract, WalletProvider};
use chatchain_shared::cooldown::Countdown;
use chatchain_shared::error::ConnectError;
use chatchain_shared::types::{ConnectionStatus, UserProfile};
use chatchain_shared::units::TokenAmount;

use crate::config::ClientConfig;

/// A connected account with both contract handles bound to it.
pub struct Session<P> {
    epoch: u64,
    account: Address,
    rpc: Rpc<P>,
    chat: ChatContract<P>,
    token: TokenContract<P>,
}

impl<P: WalletProvider> Session<P> {
    fn new(epoch: u64, account: Address, rpc: Rpc<P>, config: &ClientConfig) -> Self {
        Self {
            epoch,
            account,
            chat: ChatContract::new(rpc.clone(), config.chat_contract, account),
            token: TokenContract::new(rpc.clone(), config.token_contract, account),
            rpc,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn rpc(&self) -> &Rpc<P> {
        &self.rpc
    }

    pub fn chat(&self) -> &ChatContract<P> {
        &self.chat
    }

    pub fn token(&self) -> &TokenContract<P> {
        &self.token
    }
}

/// Cached state derived from the session account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub registered: bool,
    pub profile: Option<UserProfile>,
    pub balance: TokenAmount,
    pub cooldown: Countdown,
}

/// What subscribers see of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub epoch: u64,
    pub account: Option<Address>,
    pub connection: ConnectionStatus,
}

impl SessionStatus {
    pub fn registered(&self) -> bool {
        matches!(self.connection, ConnectionStatus::Connected { registered: true })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionStatus::Connected { .. })
    }
}

enum Phase<P> {
    Disconnected,
    Connecting,
    Connected(Arc<Session<P>>),
}

struct Inner<P> {
    epoch: u64,
    phase: Phase<P>,
    snapshot: AccountSnapshot,
    handoff: Option<UserProfile>,
}

impl<P> Inner<P> {
    fn status(&self) -> SessionStatus {
        let (account, connection) = match &self.phase {
            Phase::Disconnected => (None, ConnectionStatus::Disconnected),
            Phase::Connecting => (None, ConnectionStatus::Connecting),
            Phase::Connected(s) => (
                Some(s.account),
                ConnectionStatus::Connected {
                    registered: self.snapshot.registered,
                },
            ),
        };
        SessionStatus {
            epoch: self.epoch,
            account,
            connection,
        }
    }

    /// Start a new epoch, dropping everything tied to the previous one.
    fn advance(&mut self, phase: Phase<P>) -> u64 {
        self.epoch += 1;
        self.phase = phase;
        self.snapshot = AccountSnapshot::default();
        self.epoch
    }
}

/// Owns the one live session for a wallet provider.
pub struct SessionManager<P> {
    provider: Option<Arc<P>>,
    config: ClientConfig,
    inner: Mutex<Inner<P>>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<P: WalletProvider> SessionManager<P> {
    /// `provider` is `None` when no wallet is available; `connect` then
    /// fails with [`ConnectError::NoWallet`].
    pub fn new(provider: Option<Arc<P>>, config: ClientConfig) -> Self {
        let inner = Inner {
            epoch: 0,
            phase: Phase::Disconnected,
            snapshot: AccountSnapshot::default(),
            handoff: None,
        };
        let (status_tx, _) = watch::channel(inner.status());
        Self {
            provider,
            config,
            inner: Mutex::new(inner),
            status_tx,
        }
    }

    pub fn with_provider(provider: Arc<P>, config: ClientConfig) -> Self {
        Self::new(Some(provider), config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, inner: &Inner<P>) {
        let status = inner.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Ask the wallet for account access and build a session for the first
    /// account it grants.
    pub async fn connect(&self) -> Result<Arc<Session<P>>, ConnectError> {
        let provider = self.provider.clone().ok_or(ConnectError::NoWallet)?;
        let epoch = {
            let mut inner = self.lock();
            let epoch = inner.advance(Phase::Connecting);
            self.publish(&inner);
            epoch
        };
        info!(epoch, "Requesting wallet access");

        let rpc = Rpc::new(provider);
        let accounts = match rpc.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "Wallet access failed");
                self.abandon(epoch);
                return Err(e.classify_connect());
            }
        };
        let Some(&account) = accounts.first() else {
            warn!("Wallet granted no accounts");
            self.abandon(epoch);
            return Err(ConnectError::UserRejected);
        };

        self.establish(epoch, rpc, account)
            .await
            .ok_or_else(|| ConnectError::Network("connection superseded by a newer session".into()))
    }

    /// Silent reconnect with accounts the wallet already authorised.
    pub async fn restore(&self) -> Option<Arc<Session<P>>> {
        let provider = self.provider.clone()?;
        let rpc = Rpc::new(provider);
        let accounts = match rpc.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!(error = %e, "No session to restore");
                return None;
            }
        };
        let account = *accounts.first()?;
        let epoch = {
            let mut inner = self.lock();
            let epoch = inner.advance(Phase::Connecting);
            self.publish(&inner);
            epoch
        };
        info!(epoch, account = %account, "Restoring wallet session");
        self.establish(epoch, rpc, account).await
    }

    /// Drop the session. Wallet permissions stay granted.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        let epoch = inner.advance(Phase::Disconnected);
        inner.handoff = None;
        self.publish(&inner);
        info!(epoch, "Wallet session closed");
    }

    /// Handle an `accountsChanged` notification.
    ///
    /// Only a live or connecting session follows the wallet: after
    /// [`SessionManager::disconnect`] a new session needs `connect` again.
    /// A notification for the account already connected changes nothing.
    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) {
        let Some(&account) = accounts.first() else {
            info!("Wallet reported no accounts");
            self.disconnect();
            return;
        };
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let epoch = {
            let mut inner = self.lock();
            match &inner.phase {
                Phase::Disconnected => {
                    debug!(account = %account, "Not connected, ignoring account change");
                    return;
                }
                Phase::Connected(s) if s.account == account => {
                    debug!(account = %account, "Account unchanged");
                    return;
                }
                _ => {}
            }
            let epoch = inner.advance(Phase::Connecting);
            self.publish(&inner);
            epoch
        };
        info!(epoch, account = %account, "Wallet account changed");
        self.establish(epoch, Rpc::new(provider), account).await;
    }

    /// Forward the provider's account notifications into
    /// [`SessionManager::on_accounts_changed`] until the returned task is
    /// aborted or the provider drops its side.
    pub fn watch_accounts(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.provider.as_ref()?.subscribe_accounts();
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            while let Some(accounts) = rx.recv().await {
                debug!(count = accounts.len(), "accountsChanged");
                this.on_accounts_changed(accounts).await;
            }
            debug!("Account notifications closed");
        }))
    }

    fn abandon(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch == epoch && matches!(inner.phase, Phase::Connecting) {
            inner.phase = Phase::Disconnected;
            self.publish(&inner);
        }
    }

    /// Install a session for `account` under `epoch` and load its snapshot.
    /// Returns `None` if the epoch was superseded along the way.
    async fn establish(&self, epoch: u64, rpc: Rpc<P>, account: Address) -> Option<Arc<Session<P>>> {
        let session = Arc::new(Session::new(epoch, account, rpc, &self.config));
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!(epoch, current = inner.epoch, "Dropping superseded session");
                return None;
            }
            inner.phase = Phase::Connected(session.clone());
            self.publish(&inner);
        }

        let snapshot = load_snapshot(&session).await;
        let registered = snapshot.registered;
        self.update_snapshot(epoch, |s| *s = snapshot)?;
        info!(epoch, account = %account, registered, "Wallet session established");
        Some(session)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The live session, if any.
    pub fn current(&self) -> Option<Arc<Session<P>>> {
        match &self.lock().phase {
            Phase::Connected(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        let inner = self.lock();
        inner.epoch == epoch && matches!(inner.phase, Phase::Connected(_))
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.lock().snapshot.clone()
    }

    /// Apply `f` to the snapshot if `epoch` is still the live one.
    pub(crate) fn update_snapshot<R>(
        &self,
        epoch: u64,
        f: impl FnOnce(&mut AccountSnapshot) -> R,
    ) -> Option<R> {
        let mut inner = self.lock();
        if inner.epoch != epoch || !matches!(inner.phase, Phase::Connected(_)) {
            debug!(epoch, current = inner.epoch, "Discarding stale snapshot update");
            return None;
        }
        let out = f(&mut inner.snapshot);
        self.publish(&inner);
        Some(out)
    }

    /// Advance the local cooldown countdown by one second.
    pub fn tick_countdown(&self) -> Option<u64> {
        let epoch = self.current()?.epoch;
        self.update_snapshot(epoch, |s| s.cooldown.tick())
    }

    // -----------------------------------------------------------------------
    // Chat handoff
    // -----------------------------------------------------------------------

    /// Remember which user the next chat view should open.
    pub fn set_handoff(&self, user: UserProfile) {
        self.lock().handoff = Some(user);
    }

    /// Take the pending handoff. Yields it at most once.
    pub fn take_handoff(&self) -> Option<UserProfile> {
        self.lock().handoff.take()
    }

    /// Probe the node behind the wallet. Returns the latest block number.
    pub async fn check_network(&self) -> Result<u64, ConnectError> {
        let rpc = match self.current() {
            Some(session) => session.rpc.clone(),
            None => Rpc::new(self.provider.clone().ok_or(ConnectError::NoWallet)?),
        };
        rpc.block_number().await.map_err(|e| {
            warn!(error = %e, "Network probe failed");
            e.classify_connect()
        })
    }
}

/// Registration flag and, when registered, the on-chain profile.
pub(crate) async fn read_registration<P: WalletProvider>(
    session: &Session<P>,
) -> Result<(bool, Option<UserProfile>), ChainError> {
    let registered = session.chat.is_registered(session.account).await?;
    if !registered {
        return Ok((false, None));
    }
    let profile = session.chat.get_user_by_address(session.account).await?;
    Ok((true, Some(profile).filter(|p| p.exists)))
}

async fn load_snapshot<P: WalletProvider>(session: &Session<P>) -> AccountSnapshot {
    let account = session.account;
    let (registration, balance, cooldown) = tokio::join!(
        read_registration(session),
        session.token.balance_of(account),
        session.token.cooldown_remaining(),
    );

    let (registered, profile) = registration.unwrap_or_else(|e| {
        warn!(account = %account, error = %e, "Registration lookup failed");
        (false, None)
    });
    let balance = balance.unwrap_or_else(|e| {
        warn!(account = %account, error = %e, "Balance lookup failed");
        TokenAmount::ZERO
    });
    let cooldown = cooldown.unwrap_or_else(|e| {
        warn!(account = %account, error = %e, "Cooldown lookup failed");
        0
    });

    AccountSnapshot {
        registered,
        profile,
        balance,
        cooldown: Countdown::new(cooldown),
    }
}
