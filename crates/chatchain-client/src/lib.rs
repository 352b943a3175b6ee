//! Orchestration layer of the ChatChain client: wallet session, contract
//! reads, transaction sequencing, activity history and background polling.

pub mod config;
pub mod directory;
pub mod events;
pub mod history;
pub mod pending;
pub mod polling;
pub mod reads;
pub mod session;
pub mod writes;

#[cfg(test)]
mod testkit;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{ClientConfig, PollIntervals};
pub use events::{ClientEvent, EventSink, TxStage};
pub use history::fetch_history;
pub use polling::{Pollers, TaskScope};
pub use reads::Reads;
pub use session::{AccountSnapshot, Session, SessionManager, SessionStatus};
pub use writes::Orchestrator;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str =
    "chatchain_daemon=info,chatchain_client=debug,chatchain_chain=info,warn";

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
