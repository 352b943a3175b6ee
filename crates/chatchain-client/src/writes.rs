//! Transaction orchestration.
//!
//! Every write runs its preflight reads, then submits through the wallet and
//! waits for the receipt. A failure stops the sequence and reports the step
//! it happened in. Nothing is retried. The session epoch is checked before
//! every step, so an account switch in the middle of a sequence stops it
//! with [`WriteError::NotConnected`].

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use tracing::{debug, info, warn};

use chatchain_chain::{ProviderError, WalletProvider};
use chatchain_shared::constants::MIN_NAME_LEN;
use chatchain_shared::error::{FundsKind, WriteError, WriteFailure, WriteResult, WriteStep};
use chatchain_shared::types::UserProfile;
use chatchain_shared::units::TokenAmount;

use crate::events::{ClientEvent, EventSink, TxStage};
use crate::reads::Reads;
use crate::session::{Session, SessionManager};

pub struct Orchestrator<P> {
    session: Arc<SessionManager<P>>,
    reads: Reads<P>,
    events: EventSink,
}

impl<P> Clone for Orchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            reads: self.reads.clone(),
            events: self.events.clone(),
        }
    }
}

fn fail<T>(step: WriteStep, error: WriteError) -> WriteResult<T> {
    warn!(%step, %error, "Write aborted");
    Err(WriteFailure::new(step, error))
}

impl<P: WalletProvider> Orchestrator<P> {
    pub fn new(session: Arc<SessionManager<P>>, events: EventSink) -> Self {
        Self {
            reads: Reads::new(session.clone()),
            session,
            events,
        }
    }

    fn begin(&self) -> WriteResult<Arc<Session<P>>> {
        match self.session.current() {
            Some(s) => Ok(s),
            None => fail(WriteStep::Validate, WriteError::NotConnected),
        }
    }

    fn ensure_live(&self, session: &Session<P>, step: WriteStep) -> WriteResult<()> {
        if self.session.is_current(session.epoch()) {
            Ok(())
        } else {
            fail(step, WriteError::NotConnected)
        }
    }

    fn stage(&self, stage: TxStage) {
        debug!(?stage, "Write progress");
        self.events.emit(ClientEvent::TxStage(stage));
    }

    /// Submit through the wallet, then poll for the receipt.
    async fn transact<F>(
        &self,
        session: &Session<P>,
        submit_step: WriteStep,
        confirm_step: WriteStep,
        submit: F,
    ) -> WriteResult<B256>
    where
        F: Future<Output = Result<B256, ProviderError>>,
    {
        self.ensure_live(session, submit_step)?;
        let hash = match submit.await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(step = %submit_step, error = %e, "Wallet did not submit");
                return fail(submit_step, e.classify());
            }
        };

        // from here on a failure still carries the broadcast hash
        if let Err(failure) = self.ensure_live(session, confirm_step) {
            warn!(tx = %hash, "Session changed while the transaction was pending");
            return Err(failure.with_tx(hash));
        }
        let poll = self.session.config().receipt_poll_interval;
        let receipt = match session.rpc().wait_for_receipt(hash, poll).await {
            Ok(receipt) => receipt,
            Err(e) => return fail(confirm_step, e.classify()).map_err(|f| f.with_tx(hash)),
        };
        if !receipt.is_success() {
            return fail(confirm_step, WriteError::ContractReverted { reason: None })
                .map_err(|f| f.with_tx(hash));
        }
        info!(tx = %hash, step = %submit_step, "Transaction confirmed");
        Ok(hash)
    }

    async fn balance(&self, session: &Session<P>) -> WriteResult<TokenAmount> {
        self.ensure_live(session, WriteStep::CheckBalance)?;
        match session.token().balance_of(session.account()).await {
            Ok(balance) => Ok(balance),
            Err(e) => fail(WriteStep::CheckBalance, e.classify()),
        }
    }

    /// Approve the chat contract for exactly `amount` unless the current
    /// allowance already covers it.
    async fn ensure_allowance(&self, session: &Session<P>, amount: TokenAmount) -> WriteResult<()> {
        self.ensure_live(session, WriteStep::CheckAllowance)?;
        let spender = session.chat().address();
        let allowance = match session.token().allowance(session.account(), spender).await {
            Ok(allowance) => allowance,
            Err(e) => return fail(WriteStep::CheckAllowance, e.classify()),
        };
        if allowance >= amount {
            debug!(%allowance, %amount, "Allowance sufficient, skipping approval");
            return Ok(());
        }

        self.stage(TxStage::Approving);
        self.transact(
            session,
            WriteStep::Approve,
            WriteStep::Approve,
            session.token().approve(spender, amount),
        )
        .await?;
        Ok(())
    }

    async fn refresh_balance(&self) {
        if let Some(balance) = self.reads.refresh_balance().await {
            self.events.emit(ClientEvent::BalanceUpdated(balance));
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Send a message, paying the fixed fee.
    pub async fn send_message(&self, to: Address, content: &str) -> WriteResult<B256> {
        let session = self.begin()?;
        if content.trim().is_empty() {
            return fail(
                WriteStep::Validate,
                WriteError::validation("content", "message is empty"),
            );
        }

        let fee = TokenAmount::message_fee();
        self.stage(TxStage::CheckingBalance);
        let balance = self.balance(&session).await?;
        if balance < fee {
            return fail(
                WriteStep::CheckBalance,
                WriteError::InsufficientFunds(FundsKind::Token),
            );
        }

        self.ensure_allowance(&session, fee).await?;

        self.stage(TxStage::Sending);
        let hash = self
            .transact(
                &session,
                WriteStep::Submit,
                WriteStep::Confirm,
                session.chat().send_message(to, content),
            )
            .await?;
        info!(to = %to, tx = %hash, "Message sent");

        self.refresh_balance().await;
        Ok(hash)
    }

    /// Transfer tokens to a friend. `amount` is a human decimal string.
    pub async fn send_tokens_to_friend(&self, to: Address, amount: &str) -> WriteResult<B256> {
        let session = self.begin()?;
        let amount = match TokenAmount::parse_positive(amount) {
            Ok(amount) => amount,
            Err(e) => return fail(WriteStep::Validate, WriteError::validation("amount", e.to_string())),
        };

        self.stage(TxStage::CheckingFriendship);
        self.ensure_live(&session, WriteStep::CheckFriendship)?;
        match session.chat().check_friendship(session.account(), to).await {
            Ok(true) => {}
            Ok(false) => return fail(WriteStep::CheckFriendship, WriteError::NotFriends),
            Err(e) => return fail(WriteStep::CheckFriendship, e.classify()),
        }

        self.stage(TxStage::CheckingBalance);
        let balance = self.balance(&session).await?;
        if balance < amount {
            return fail(
                WriteStep::CheckBalance,
                WriteError::InsufficientFunds(FundsKind::Token),
            );
        }

        self.ensure_allowance(&session, amount).await?;

        self.stage(TxStage::Sending);
        let hash = self
            .transact(
                &session,
                WriteStep::Submit,
                WriteStep::Confirm,
                session.chat().send_tokens_to_friend(to, amount),
            )
            .await?;
        info!(to = %to, %amount, tx = %hash, "Tokens sent");

        self.refresh_balance().await;
        Ok(hash)
    }

    /// Register the session account under `name`, then read the profile back.
    pub async fn register_user(&self, name: &str) -> WriteResult<UserProfile> {
        let session = self.begin()?;
        let name = name.trim();
        if name.chars().count() < MIN_NAME_LEN {
            return fail(
                WriteStep::Validate,
                WriteError::validation(
                    "name",
                    format!("must be at least {MIN_NAME_LEN} characters"),
                ),
            );
        }

        let hash = self
            .transact(
                &session,
                WriteStep::Submit,
                WriteStep::Confirm,
                session.chat().register_user(name),
            )
            .await?;

        self.ensure_live(&session, WriteStep::ReadBack)?;
        let profile = match session.chat().get_user_by_address(session.account()).await {
            Ok(profile) => profile,
            Err(e) => return fail(WriteStep::ReadBack, e.classify()).map_err(|f| f.with_tx(hash)),
        };
        if !profile.exists {
            return fail(
                WriteStep::ReadBack,
                WriteError::Network("registration not visible after confirmation".into()),
            )
            .map_err(|f| f.with_tx(hash));
        }
        let stored = profile.clone();
        self.session.update_snapshot(session.epoch(), |snap| {
            snap.registered = true;
            snap.profile = Some(stored);
        });
        info!(name, tx = %hash, "User registered");
        Ok(profile)
    }

    /// Add `friend`. Existing friendships are not pre-checked; the contract
    /// decides.
    pub async fn add_friend(&self, friend: Address) -> WriteResult<B256> {
        let session = self.begin()?;
        if friend == session.account() {
            return fail(
                WriteStep::Validate,
                WriteError::validation("address", "cannot add yourself as a friend"),
            );
        }
        if friend == Address::ZERO {
            return fail(
                WriteStep::Validate,
                WriteError::validation("address", "zero address"),
            );
        }

        let hash = self
            .transact(
                &session,
                WriteStep::Submit,
                WriteStep::Confirm,
                session.chat().add_friend(friend),
            )
            .await?;
        info!(friend = %friend, tx = %hash, "Friend added");
        Ok(hash)
    }

    /// Claim the faucet grant.
    pub async fn request_tokens(&self) -> WriteResult<B256> {
        let session = self.begin()?;

        self.ensure_live(&session, WriteStep::CheckCooldown)?;
        let remaining = match session.token().cooldown_remaining().await {
            Ok(secs) => secs,
            Err(e) => return fail(WriteStep::CheckCooldown, e.classify()),
        };
        if remaining > 0 {
            self.session
                .update_snapshot(session.epoch(), |snap| snap.cooldown.reset(remaining));
            return fail(
                WriteStep::CheckCooldown,
                WriteError::CooldownActive {
                    remaining_secs: remaining,
                },
            );
        }

        let hash = match self
            .transact(
                &session,
                WriteStep::Submit,
                WriteStep::Confirm,
                session.token().request_tokens(),
            )
            .await
        {
            Ok(hash) => hash,
            Err(failure) => return Err(self.cooldown_revert(&session, failure).await),
        };
        info!(tx = %hash, grant = %TokenAmount::faucet_grant(), "Faucet claimed");

        self.refresh_balance().await;
        if let Some(secs) = self.reads.refresh_cooldown().await {
            self.events.emit(ClientEvent::CooldownUpdated(secs));
        }
        Ok(hash)
    }

    /// A faucet revert that names the cooldown becomes `CooldownActive`.
    async fn cooldown_revert(&self, session: &Session<P>, failure: WriteFailure) -> WriteFailure {
        let WriteError::ContractReverted { reason: Some(reason) } = &failure.error else {
            return failure;
        };
        if !reason.to_lowercase().contains("cooldown") {
            return failure;
        }
        let remaining_secs = session.token().cooldown_remaining().await.unwrap_or_default();
        WriteFailure {
            error: WriteError::CooldownActive { remaining_secs },
            ..failure
        }
    }
}
