//! Background pollers and the scope that owns them.
//!
//! A view creates a [`TaskScope`], starts the pollers it needs into it and
//! drops the scope when it goes away. Dropping aborts every task. A scope
//! built with [`TaskScope::bound_to`] also stops its tasks on its own once
//! the session epoch moves on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

use chatchain_chain::WalletProvider;

use crate::config::PollIntervals;
use crate::events::{ClientEvent, EventSink};
use crate::pending::scan_pending;
use crate::reads::Reads;
use crate::session::{SessionManager, SessionStatus};

#[derive(Default)]
pub struct TaskScope {
    tasks: JoinSet<()>,
    epoch: Option<(u64, watch::Receiver<SessionStatus>)>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope whose tasks end when the current session epoch ends.
    pub fn bound_to<P: WalletProvider>(session: &SessionManager<P>) -> Self {
        let rx = session.subscribe();
        let epoch = rx.borrow().epoch;
        Self {
            tasks: JoinSet::new(),
            epoch: Some((epoch, rx)),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.epoch {
            None => {
                self.tasks.spawn(task);
            }
            Some((epoch, rx)) => {
                let epoch = *epoch;
                let rx = rx.clone();
                self.tasks.spawn(async move {
                    tokio::select! {
                        _ = task => {}
                        _ = epoch_ended(rx, epoch) => debug!(task = name, epoch, "Session changed, poller stopped"),
                    }
                });
            }
        }
        debug!(task = name, "Poller started");
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task of the scope.
    pub fn cancel_all(&mut self) {
        self.tasks.abort_all();
    }

    /// Wait until every task has ended.
    pub async fn wait(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn epoch_ended(mut rx: watch::Receiver<SessionStatus>, epoch: u64) {
    loop {
        if rx.borrow_and_update().epoch != epoch {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn every(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Starts the periodic reads a view needs.
pub struct Pollers<P> {
    reads: Reads<P>,
    events: EventSink,
    intervals: PollIntervals,
}

impl<P: WalletProvider> Pollers<P> {
    pub fn new(session: Arc<SessionManager<P>>, events: EventSink) -> Self {
        Self {
            intervals: session.config().poll,
            reads: Reads::new(session),
            events,
        }
    }

    /// Friend list.
    pub fn watch_friends(&self, scope: &mut TaskScope) {
        let reads = self.reads.clone();
        let events = self.events.clone();
        let period = self.intervals.friends;
        scope.spawn("friends", async move {
            let mut ticker = every(period);
            loop {
                ticker.tick().await;
                events.emit(ClientEvent::FriendsUpdated(reads.get_friends().await));
            }
        });
    }

    /// The open conversation with `peer`.
    pub fn watch_conversation(&self, scope: &mut TaskScope, peer: Address) {
        let reads = self.reads.clone();
        let events = self.events.clone();
        let period = self.intervals.messages;
        scope.spawn("conversation", async move {
            let mut ticker = every(period);
            loop {
                ticker.tick().await;
                let messages = reads.get_messages(peer).await;
                events.emit(ClientEvent::ConversationUpdated { peer, messages });
            }
        });
    }

    /// Messages from users who are not friends.
    pub fn watch_pending(&self, scope: &mut TaskScope) {
        let reads = self.reads.clone();
        let events = self.events.clone();
        let period = self.intervals.pending;
        scope.spawn("pending", async move {
            let mut ticker = every(period);
            loop {
                ticker.tick().await;
                events.emit(ClientEvent::PendingUpdated(scan_pending(&reads).await));
            }
        });
    }

    /// Balance and cooldown refreshes plus the one-second local countdown.
    pub fn watch_faucet(&self, scope: &mut TaskScope) {
        let reads = self.reads.clone();
        let events = self.events.clone();
        let period = self.intervals.faucet;
        scope.spawn("faucet", async move {
            let mut ticker = every(period);
            loop {
                ticker.tick().await;
                if let Some(balance) = reads.refresh_balance().await {
                    events.emit(ClientEvent::BalanceUpdated(balance));
                }
                if let Some(secs) = reads.refresh_cooldown().await {
                    events.emit(ClientEvent::CooldownUpdated(secs));
                }
            }
        });

        let session = self.reads.session().clone();
        let events = self.events.clone();
        let period = self.intervals.countdown;
        scope.spawn("countdown", async move {
            let mut ticker = every(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(remaining) = session.tick_countdown() {
                    events.emit(ClientEvent::CountdownTick(remaining));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use chatchain_chain::contracts::IChatContract;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_friends_poller_cadence() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        wallet.on_call::<IChatContract::getFriendsCall>(vec![chat_user(bob(), "bob")]);
        let (events, mut rx) = EventSink::channel();
        let pollers = Pollers::new(manager, events);

        let mut scope = TaskScope::new();
        pollers.watch_friends(&mut scope);

        let start = Instant::now();
        let first = rx.recv().await.unwrap();
        assert!(matches!(&first, ClientEvent::FriendsUpdated(f) if f.len() == 1));
        rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(wallet.call_count::<IChatContract::getFriendsCall>(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_pollers() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        wallet.on_call::<IChatContract::getMessagesCall>(vec![]);
        let (events, mut rx) = EventSink::channel();
        let pollers = Pollers::new(manager, events);

        let mut scope = TaskScope::new();
        pollers.watch_conversation(&mut scope, bob());
        pollers.watch_friends(&mut scope);
        assert_eq!(scope.len(), 2);
        rx.recv().await.unwrap();

        scope.cancel_all();
        scope.wait().await;
        drain(&mut rx);
        let calls = wallet.call_count::<IChatContract::getMessagesCall>();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(wallet.call_count::<IChatContract::getMessagesCall>(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_ends_with_session_epoch() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        wallet.on_call::<IChatContract::getFriendsCall>(vec![]);
        let (events, mut rx) = EventSink::channel();
        let pollers = Pollers::new(manager.clone(), events);

        let mut scope = TaskScope::bound_to(&manager);
        pollers.watch_friends(&mut scope);
        rx.recv().await.unwrap();

        manager.on_accounts_changed(vec![bob()]).await;
        let ended = tokio::time::timeout(Duration::from_secs(5), scope.wait()).await;
        assert!(ended.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_never_goes_negative() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        stub_cooldown(&wallet, 2);
        let (events, mut rx) = EventSink::channel();
        let pollers = Pollers::new(manager.clone(), events);

        let mut scope = TaskScope::bound_to(&manager);
        pollers.watch_faucet(&mut scope);

        let mut ticks = Vec::new();
        while ticks.len() < 4 {
            if let ClientEvent::CountdownTick(secs) = rx.recv().await.unwrap() {
                ticks.push(secs);
            }
        }
        assert_eq!(ticks, [1, 0, 0, 0]);
        assert!(manager.snapshot().cooldown.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_faucet_refresh_resets_countdown() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        stub_cooldown(&wallet, 0);
        let (events, mut rx) = EventSink::channel();
        let pollers = Pollers::new(manager.clone(), events);

        let mut scope = TaskScope::new();
        pollers.watch_faucet(&mut scope);
        loop {
            if let ClientEvent::CooldownUpdated(secs) = rx.recv().await.unwrap() {
                assert_eq!(secs, 0);
                break;
            }
        }

        stub_cooldown(&wallet, 500);
        loop {
            if let ClientEvent::CooldownUpdated(secs) = rx.recv().await.unwrap() {
                assert_eq!(secs, 500);
                break;
            }
        }
        assert!(manager.snapshot().cooldown.remaining() <= 500);
    }
}
