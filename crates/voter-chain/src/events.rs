//! On-chain confirmation listener.
//!
//! Polls the submitter contract's logs with a block cursor and advances
//! commit-reveal records when the chain confirms the corresponding
//! transaction. The submission pipeline does not depend on this loop for
//! correctness; the listener is an independent cross-check that what the
//! chain recorded matches what was sent, loudly flagging any divergence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, LogData, B256, U256};
use alloy::sol_types::SolEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contracts::IPriceSubmitter;
use crate::rpc::{ChainRpc, LogEntry};
use voter_core::{EpochId, RecordStore, RevealPhase};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub poll_interval_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
        }
    }
}

pub struct ConfirmationListener {
    rpc: Arc<dyn ChainRpc>,
    submitter: Address,
    voter: Address,
    /// Asset index to symbol, fixed at startup resolution.
    assets: HashMap<u32, String>,
    records: Arc<RecordStore>,
    config: ListenerConfig,
}

impl ConfirmationListener {
    #[must_use]
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        submitter: Address,
        voter: Address,
        assets: HashMap<u32, String>,
        records: Arc<RecordStore>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            rpc,
            submitter,
            voter,
            assets,
            records,
            config,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut cursor = match self.rpc.block_number().await {
            Ok(head) => head + 1,
            Err(e) => {
                error!(error = %e, "listener could not read chain head, stopping");
                return;
            }
        };
        info!(from_block = cursor, "confirmation listener started");

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("confirmation listener stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            match self.poll_once(cursor).await {
                Ok(next_cursor) => cursor = next_cursor,
                Err(e) => warn!(error = %e, "log poll failed, will retry"),
            }
        }
    }

    /// One poll step: process logs in [cursor, head], return the next cursor.
    async fn poll_once(&self, cursor: u64) -> crate::ChainResult<u64> {
        let head = self.rpc.block_number().await?;
        if head < cursor {
            return Ok(cursor);
        }
        let logs = self.rpc.get_logs(self.submitter, cursor, head).await?;
        for log in logs {
            self.handle_log(&log);
        }
        Ok(head + 1)
    }

    fn handle_log(&self, log: &LogEntry) {
        let Some(&topic0) = log.topics.first() else {
            return;
        };
        let data = LogData::new_unchecked(log.topics.clone(), log.data.clone().into());

        if topic0 == IPriceSubmitter::PriceHashesSubmitted::SIGNATURE_HASH {
            match IPriceSubmitter::PriceHashesSubmitted::decode_log_data(&data, true) {
                Ok(ev) => self.on_hashes_submitted(&ev),
                Err(e) => warn!(error = %e, "undecodable PriceHashesSubmitted log"),
            }
        } else if topic0 == IPriceSubmitter::PricesRevealed::SIGNATURE_HASH {
            match IPriceSubmitter::PricesRevealed::decode_log_data(&data, true) {
                Ok(ev) => self.on_prices_revealed(&ev),
                Err(e) => warn!(error = %e, "undecodable PricesRevealed log"),
            }
        } else if topic0 == IPriceSubmitter::PriceFinalized::SIGNATURE_HASH {
            match IPriceSubmitter::PriceFinalized::decode_log_data(&data, true) {
                Ok(ev) => self.on_price_finalized(&ev),
                Err(e) => warn!(error = %e, "undecodable PriceFinalized log"),
            }
        } else if topic0 == IPriceSubmitter::RewardEpochFinalized::SIGNATURE_HASH {
            if let Ok(ev) = IPriceSubmitter::RewardEpochFinalized::decode_log_data(&data, true) {
                info!(
                    reward_epoch = u256_to_u64(ev.rewardEpochId),
                    "reward epoch finalized"
                );
            }
        }
    }

    fn on_hashes_submitted(&self, ev: &IPriceSubmitter::PriceHashesSubmitted) {
        if ev.submitter != self.voter {
            return;
        }
        let epoch = EpochId(u256_to_u64(ev.epochId));
        for index in &ev.assetIndices {
            let Some(symbol) = self.symbol_for(*index) else {
                continue;
            };
            if self
                .records
                .advance_if(symbol, epoch, RevealPhase::Committing)
                .is_some()
            {
                debug!(symbol, epoch = epoch.0, "commit confirmed on chain");
            }
        }
    }

    fn on_prices_revealed(&self, ev: &IPriceSubmitter::PricesRevealed) {
        if ev.voter != self.voter {
            return;
        }
        let epoch = EpochId(u256_to_u64(ev.epochId));
        let nonce = u256_to_u64(ev.randomNonce);

        for (index, price) in ev.assetIndices.iter().zip(ev.prices.iter()) {
            let Some(symbol) = self.symbol_for(*index) else {
                continue;
            };
            let Some(record) = self.records.get(symbol, epoch) else {
                warn!(symbol, epoch = epoch.0, "reveal observed without a record");
                continue;
            };

            let chain_price = u128::try_from(*price).unwrap_or(u128::MAX);
            if chain_price != record.committed_price || nonce != record.random_nonce {
                error!(
                    symbol,
                    epoch = epoch.0,
                    committed = record.committed_price,
                    revealed = chain_price,
                    "revealed price does not match local record"
                );
                voter_telemetry::metrics::INTEGRITY_MISMATCHES_TOTAL.inc();
            }

            if self
                .records
                .advance_if(symbol, epoch, RevealPhase::Revealing)
                .is_some()
            {
                debug!(symbol, epoch = epoch.0, "reveal confirmed on chain");
            }
        }
    }

    fn on_price_finalized(&self, ev: &IPriceSubmitter::PriceFinalized) {
        let symbol = self.symbol_for(ev.assetIndex).unwrap_or("?");
        info!(
            symbol,
            epoch = u256_to_u64(ev.epochId),
            price_units = u256_to_u64(ev.price),
            "price finalized"
        );
    }

    fn symbol_for(&self, index: U256) -> Option<&str> {
        let index = u32::try_from(index).ok()?;
        self.assets.get(&index).map(String::as_str)
    }
}

fn u256_to_u64(v: U256) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::BoxFuture;
    use crate::ChainResult;
    use voter_core::CommitRevealRecord;

    struct NullRpc;

    impl ChainRpc for NullRpc {
        fn transaction_count(&self, _address: Address) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(0) })
        }
        fn send_raw_transaction(&self, _raw: Vec<u8>) -> BoxFuture<'_, ChainResult<B256>> {
            Box::pin(async { Ok(B256::ZERO) })
        }
        fn transaction_receipt(&self, _hash: B256) -> BoxFuture<'_, ChainResult<Option<bool>>> {
            Box::pin(async { Ok(None) })
        }
        fn call(&self, _to: Address, _data: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn get_logs(
            &self,
            _address: Address,
            _from: u64,
            _to: u64,
        ) -> BoxFuture<'_, ChainResult<Vec<LogEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(0) })
        }
        fn chain_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(31337) })
        }
    }

    fn listener(records: Arc<RecordStore>) -> ConfirmationListener {
        let mut assets = HashMap::new();
        assets.insert(0u32, "XRP".to_string());
        assets.insert(1u32, "BTC".to_string());
        ConfirmationListener::new(
            Arc::new(NullRpc),
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x11),
            assets,
            records,
            ListenerConfig::default(),
        )
    }

    fn log_from<E: SolEvent>(ev: &E) -> LogEntry {
        let data = ev.encode_log_data();
        LogEntry {
            address: Address::repeat_byte(0xaa),
            topics: data.topics().to_vec(),
            data: data.data.to_vec(),
            block_number: 1,
        }
    }

    #[test]
    fn test_own_commit_advances_record() {
        let records = Arc::new(RecordStore::new());
        records.insert(CommitRevealRecord::new("XRP".into(), EpochId(5), 123, 9));
        let listener = listener(Arc::clone(&records));

        let ev = IPriceSubmitter::PriceHashesSubmitted {
            submitter: Address::repeat_byte(0x11),
            epochId: U256::from(5u64),
            assetIndices: vec![U256::from(0u64)],
            commitHashes: vec![B256::ZERO],
            timestamp: U256::ZERO,
        };
        listener.handle_log(&log_from(&ev));

        assert_eq!(
            records.get("XRP", EpochId(5)).unwrap().phase,
            RevealPhase::Committed
        );
    }

    #[test]
    fn test_foreign_commit_is_ignored() {
        let records = Arc::new(RecordStore::new());
        records.insert(CommitRevealRecord::new("XRP".into(), EpochId(5), 123, 9));
        let listener = listener(Arc::clone(&records));

        let ev = IPriceSubmitter::PriceHashesSubmitted {
            submitter: Address::repeat_byte(0x99),
            epochId: U256::from(5u64),
            assetIndices: vec![U256::from(0u64)],
            commitHashes: vec![B256::ZERO],
            timestamp: U256::ZERO,
        };
        listener.handle_log(&log_from(&ev));

        assert_eq!(
            records.get("XRP", EpochId(5)).unwrap().phase,
            RevealPhase::Committing
        );
    }

    #[test]
    fn test_matching_reveal_advances_record() {
        let records = Arc::new(RecordStore::new());
        let mut record = CommitRevealRecord::new("BTC".into(), EpochId(7), 45_000_00000, 77);
        record.advance();
        record.advance();
        assert_eq!(record.phase, RevealPhase::Revealing);
        records.insert(record);
        let listener = listener(Arc::clone(&records));

        let ev = IPriceSubmitter::PricesRevealed {
            voter: Address::repeat_byte(0x11),
            epochId: U256::from(7u64),
            assetIndices: vec![U256::from(1u64)],
            prices: vec![U256::from(45_000_00000u64)],
            randomNonce: U256::from(77u64),
            timestamp: U256::ZERO,
        };
        listener.handle_log(&log_from(&ev));

        assert_eq!(
            records.get("BTC", EpochId(7)).unwrap().phase,
            RevealPhase::Revealed
        );
    }

    #[test]
    fn test_mismatched_reveal_still_advances() {
        let records = Arc::new(RecordStore::new());
        let mut record = CommitRevealRecord::new("BTC".into(), EpochId(7), 45_000_00000, 77);
        record.advance();
        record.advance();
        records.insert(record);
        let listener = listener(Arc::clone(&records));

        let ev = IPriceSubmitter::PricesRevealed {
            voter: Address::repeat_byte(0x11),
            epochId: U256::from(7u64),
            assetIndices: vec![U256::from(1u64)],
            prices: vec![U256::from(1u64)],
            randomNonce: U256::from(77u64),
            timestamp: U256::ZERO,
        };
        listener.handle_log(&log_from(&ev));

        // Divergence is flagged, not fatal; the lifecycle still closes.
        assert_eq!(
            records.get("BTC", EpochId(7)).unwrap().phase,
            RevealPhase::Revealed
        );
    }

    #[test]
    fn test_unknown_topic_is_ignored() {
        let records = Arc::new(RecordStore::new());
        let listener = listener(Arc::clone(&records));
        listener.handle_log(&LogEntry {
            address: Address::ZERO,
            topics: vec![B256::repeat_byte(0xff)],
            data: Vec::new(),
            block_number: 1,
        });
    }
}
