//! Activity feed rebuilt from contract event logs.
//!
//! Five filters are queried concurrently over a bounded lookback window.
//! Each query fails on its own: a broken filter costs its records, not the
//! feed. Block timestamps are fetched once per distinct block.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use futures::future::join_all;
use tracing::{debug, warn};

use chatchain_chain::contracts::{IChatContract, IChatToken};
use chatchain_chain::{LogFilter, RpcLog, WalletProvider};
use chatchain_shared::types::{TransactionKind, TransactionRecord};
use chatchain_shared::units::TokenAmount;

use crate::session::Session;

/// A decoded log still waiting for its block timestamp.
struct Pending {
    kind: TransactionKind,
    from: Option<Address>,
    to: Option<Address>,
    amount: Option<TokenAmount>,
    block: u64,
    tx_hash: B256,
    log_index: u64,
}

fn filters(
    account: Address,
    chat: Address,
    token: Address,
    from_block: u64,
) -> Vec<(TransactionKind, LogFilter)> {
    let me = Some(account.into_word());
    let filter = |address: Address, topics: Vec<Option<B256>>| LogFilter {
        address,
        from_block,
        topics,
    };
    vec![
        (
            TransactionKind::TokenSent,
            filter(token, vec![Some(IChatToken::Transfer::SIGNATURE_HASH), me, None]),
        ),
        (
            TransactionKind::TokenReceived,
            filter(token, vec![Some(IChatToken::Transfer::SIGNATURE_HASH), None, me]),
        ),
        (
            TransactionKind::TokenRequested,
            filter(token, vec![Some(IChatToken::TokensRequested::SIGNATURE_HASH), me]),
        ),
        (
            TransactionKind::MessageSent,
            filter(chat, vec![Some(IChatContract::MessageSent::SIGNATURE_HASH), me]),
        ),
        (
            TransactionKind::FriendAdded,
            filter(chat, vec![Some(IChatContract::FriendAdded::SIGNATURE_HASH), me]),
        ),
    ]
}

fn decode(kind: TransactionKind, log: &RpcLog) -> Result<Pending, String> {
    let block = log.block().ok_or("log has no block number")?;
    let tx_hash = log.transaction_hash.ok_or("log has no transaction hash")?;
    let topics = log.topics.iter().copied();
    let data = &log.data[..];

    let (from, to, amount) = match kind {
        TransactionKind::TokenSent | TransactionKind::TokenReceived => {
            let ev = IChatToken::Transfer::decode_raw_log(topics, data).map_err(|e| e.to_string())?;
            (Some(ev.from), Some(ev.to), Some(TokenAmount::from_base_units(ev.value)))
        }
        TransactionKind::TokenRequested => {
            let ev = IChatToken::TokensRequested::decode_raw_log(topics, data).map_err(|e| e.to_string())?;
            // the claimant receives the grant
            (None, Some(ev.user), Some(TokenAmount::from_base_units(ev.amount)))
        }
        TransactionKind::MessageSent => {
            let ev = IChatContract::MessageSent::decode_raw_log(topics, data).map_err(|e| e.to_string())?;
            (Some(ev.from), Some(ev.to), None)
        }
        TransactionKind::FriendAdded => {
            let ev = IChatContract::FriendAdded::decode_raw_log(topics, data).map_err(|e| e.to_string())?;
            (Some(ev.user), Some(ev.friend), None)
        }
    };

    Ok(Pending {
        kind,
        from,
        to,
        amount,
        block,
        tx_hash,
        log_index: log.index(),
    })
}

/// Rebuild the activity feed of the session account, newest first.
pub async fn fetch_history<P: WalletProvider>(
    session: &Session<P>,
    lookback_blocks: u64,
) -> Vec<TransactionRecord> {
    let rpc = session.rpc();
    let latest = match rpc.block_number().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Cannot read latest block, history unavailable");
            return Vec::new();
        }
    };
    let from_block = latest.saturating_sub(lookback_blocks);
    debug!(from_block, latest, "Loading history");

    let queries = filters(
        session.account(),
        session.chat().address(),
        session.token().address(),
        from_block,
    );
    let results = join_all(queries.iter().map(|(_, filter)| rpc.get_logs(filter))).await;

    let mut seen = HashSet::new();
    let mut pending = Vec::new();
    for ((kind, _), result) in queries.iter().zip(results) {
        let logs = match result {
            Ok(logs) => logs,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "History query failed");
                continue;
            }
        };
        for log in &logs {
            match decode(*kind, log) {
                Ok(p) => {
                    if seen.insert((p.kind, p.tx_hash, p.log_index)) {
                        pending.push(p);
                    }
                }
                Err(e) => debug!(kind = ?kind, error = %e, "Skipping undecodable log"),
            }
        }
    }

    let mut blocks: Vec<u64> = pending.iter().map(|p| p.block).collect();
    blocks.sort_unstable();
    blocks.dedup();
    let stamps = join_all(blocks.iter().map(|&b| rpc.block_timestamp(b))).await;
    let mut timestamps = HashMap::with_capacity(blocks.len());
    for (block, stamp) in blocks.into_iter().zip(stamps) {
        match stamp {
            Ok(ts) => {
                timestamps.insert(block, ts);
            }
            Err(e) => warn!(block, error = %e, "Block timestamp unavailable, dropping its events"),
        }
    }

    let mut records: Vec<TransactionRecord> = pending
        .into_iter()
        .filter_map(|p| {
            Some(TransactionRecord {
                kind: p.kind,
                from: p.from,
                to: p.to,
                amount: p.amount,
                timestamp_secs: *timestamps.get(&p.block)?,
                tx_hash: p.tx_hash,
                log_index: p.log_index,
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.timestamp_secs
            .cmp(&a.timestamp_secs)
            .then(b.log_index.cmp(&a.log_index))
    });
    debug!(count = records.len(), "History loaded");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use alloy_primitives::U256;
    use chatchain_chain::mock::MockWallet;
    use chatchain_chain::ProviderError;

    const LATEST: u64 = 20_000;

    fn word(a: Address) -> B256 {
        a.into_word()
    }

    fn value(n: u64) -> Vec<u8> {
        U256::from(n).to_be_bytes::<32>().to_vec()
    }

    fn log(topics: Vec<B256>, data: Vec<u8>, block: u64, tx: u8, index: u64) -> RpcLog {
        MockWallet::log(Address::ZERO, topics, data, block, B256::repeat_byte(tx), index)
    }

    fn all_filters() -> Vec<(TransactionKind, LogFilter)> {
        let cfg = test_config();
        filters(alice(), cfg.chat_contract, cfg.token_contract, LATEST - 10_000)
    }

    fn filter_for(kind: TransactionKind) -> Vec<Option<B256>> {
        all_filters()
            .into_iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, f)| f.topics)
            .unwrap()
    }

    fn stub_blocks(wallet: &MockWallet, blocks: impl IntoIterator<Item = u64>) {
        wallet.set_block_number(LATEST);
        for b in blocks {
            wallet.set_block_timestamp(b, 1_000_000 + b);
        }
    }

    #[test]
    fn test_filters_cover_every_kind() {
        let filters = all_filters();
        let kinds: HashSet<TransactionKind> = filters.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds.len(), TransactionKind::ALL.len());
        for (_, f) in &filters {
            assert_eq!(f.from_block, 10_000);
        }
    }

    #[tokio::test]
    async fn test_one_failing_query_keeps_the_rest() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        let transfer = IChatToken::Transfer::SIGNATURE_HASH;
        let sent = IChatContract::MessageSent::SIGNATURE_HASH;
        let friend = IChatContract::FriendAdded::SIGNATURE_HASH;
        stub_blocks(&wallet, 100..110);

        wallet.on_logs(
            filter_for(TransactionKind::TokenSent),
            vec![
                log(vec![transfer, word(alice()), word(bob())], value(5), 100, 1, 0),
                log(vec![transfer, word(alice()), word(carol())], value(7), 101, 2, 0),
            ],
        );
        wallet.on_logs(
            filter_for(TransactionKind::TokenReceived),
            vec![log(vec![transfer, word(bob()), word(alice())], value(3), 102, 3, 0)],
        );
        wallet.fail_logs(
            filter_for(TransactionKind::TokenRequested),
            ProviderError::rpc(-32005, "query returned more than 10000 results"),
        );
        wallet.on_logs(
            filter_for(TransactionKind::MessageSent),
            vec![
                log(vec![sent, word(alice()), word(bob())], vec![], 103, 4, 0),
                log(vec![sent, word(alice()), word(bob())], vec![], 104, 5, 0),
                log(vec![sent, word(alice()), word(carol())], vec![], 105, 6, 1),
            ],
        );
        wallet.on_logs(
            filter_for(TransactionKind::FriendAdded),
            vec![log(vec![friend, word(alice()), word(bob())], vec![], 106, 7, 0)],
        );

        let session = manager.current().unwrap();
        let records = fetch_history(&session, 10_000).await;
        assert_eq!(records.len(), 7);
        assert!(records
            .windows(2)
            .all(|w| w[0].timestamp_secs >= w[1].timestamp_secs));
        assert_eq!(records[0].kind, TransactionKind::FriendAdded);
        assert_eq!(records[0].to, Some(bob()));

        let received = records
            .iter()
            .find(|r| r.kind == TransactionKind::TokenReceived)
            .unwrap();
        assert_eq!(received.from, Some(bob()));
        assert_eq!(received.amount, Some(TokenAmount::from_base_units(U256::from(3))));
    }

    #[tokio::test]
    async fn test_duplicates_and_unresolved_blocks_are_dropped() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        let requested = IChatToken::TokensRequested::SIGNATURE_HASH;
        stub_blocks(&wallet, [200]);

        let claim = log(vec![requested, word(alice())], value(10), 200, 9, 2);
        let orphan = log(vec![requested, word(alice())], value(10), 201, 10, 0);
        wallet.on_logs(
            filter_for(TransactionKind::TokenRequested),
            vec![claim.clone(), claim, orphan],
        );

        let session = manager.current().unwrap();
        let records = fetch_history(&session, 10_000).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp_secs, 1_000_200);
        assert_eq!(records[0].from, None);
        assert_eq!(records[0].to, Some(alice()));
        assert_eq!(records[0].log_index, 2);

        let lookups = wallet
            .requests()
            .iter()
            .filter(|m| *m == "eth_getBlockByNumber")
            .count();
        assert_eq!(lookups, 2);
    }

    #[tokio::test]
    async fn test_block_number_failure_empties_feed() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        wallet.fail_block_number(ProviderError::Transport("down".into()));
        let session = manager.current().unwrap();
        assert!(fetch_history(&session, 10_000).await.is_empty());
        assert!(!wallet.requests().iter().any(|m| m == "eth_getLogs"));
    }

    #[tokio::test]
    async fn test_lookback_clamps_at_genesis() {
        let (wallet, manager) = connected(alice(), "alice", "1").await;
        wallet.set_block_number(50);
        let session = manager.current().unwrap();
        assert!(fetch_history(&session, 10_000).await.is_empty());

        let filters = filters(alice(), Address::ZERO, Address::ZERO, 50u64.saturating_sub(10_000));
        assert!(filters.iter().all(|(_, f)| f.from_block == 0));
    }
}
