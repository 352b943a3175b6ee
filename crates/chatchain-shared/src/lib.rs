//! Types shared by every ChatChain crate: constants, token units, the
//! domain model and the error taxonomy.

pub mod constants;
pub mod cooldown;
pub mod error;
pub mod types;
pub mod units;

pub use alloy_primitives::{Address, B256, U256};
