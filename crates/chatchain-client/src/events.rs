use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::mpsc;

use chatchain_shared::types::{Message, UserProfile};
use chatchain_shared::units::TokenAmount;

use crate::pending::PendingConversation;

pub const EVENT_FRIENDS_UPDATED: &str = "friends-updated";
pub const EVENT_CONVERSATION_UPDATED: &str = "conversation-updated";
pub const EVENT_PENDING_UPDATED: &str = "pending-updated";
pub const EVENT_BALANCE_UPDATED: &str = "balance-updated";
pub const EVENT_COOLDOWN_UPDATED: &str = "cooldown-updated";
pub const EVENT_COUNTDOWN_TICK: &str = "countdown-tick";
pub const EVENT_TX_STAGE: &str = "tx-stage";

/// Progress of a multi-step write, for spinners and button labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxStage {
    CheckingFriendship,
    CheckingBalance,
    Approving,
    Sending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    FriendsUpdated(Vec<UserProfile>),
    ConversationUpdated {
        peer: Address,
        messages: Vec<Message>,
    },
    PendingUpdated(Vec<PendingConversation>),
    BalanceUpdated(TokenAmount),
    CooldownUpdated(u64),
    CountdownTick(u64),
    TxStage(TxStage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::FriendsUpdated(_) => EVENT_FRIENDS_UPDATED,
            ClientEvent::ConversationUpdated { .. } => EVENT_CONVERSATION_UPDATED,
            ClientEvent::PendingUpdated(_) => EVENT_PENDING_UPDATED,
            ClientEvent::BalanceUpdated(_) => EVENT_BALANCE_UPDATED,
            ClientEvent::CooldownUpdated(_) => EVENT_COOLDOWN_UPDATED,
            ClientEvent::CountdownTick(_) => EVENT_COUNTDOWN_TICK,
            ClientEvent::TxStage(_) => EVENT_TX_STAGE,
        }
    }
}

/// Outbound half of the event stream. Cloned into every poller.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ClientEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(event) {
            tracing::error!(event = e.0.name(), "Failed to emit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_and_tags_agree() {
        let event = ClientEvent::CountdownTick(5);
        assert_eq!(event.name(), "countdown-tick");

        let (sink, mut rx) = EventSink::channel();
        sink.emit(ClientEvent::TxStage(TxStage::Approving));
        match rx.try_recv().unwrap() {
            ClientEvent::TxStage(stage) => assert_eq!(stage, TxStage::Approving),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(ClientEvent::BalanceUpdated(TokenAmount::ZERO));
        EventSink::disabled().emit(ClientEvent::CooldownUpdated(0));
    }
}
