//! The epoch loop.
//!
//! One iteration per submit epoch: log the epoch banner, and when asset
//! discovery is complete spawn a commit task early in the submit window
//! and a reveal task just after the submit deadline, then sleep to the
//! deadline and repeat. Tasks hand their work to the action queue, so
//! nothing here ever signs or broadcasts directly.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voter_chain::{ActionQueue, TxSender, WhitelistGuard};
use voter_core::{CommitBinding, EpochId, EpochSettings, RecordStore, RevealPhase};
use voter_registry::AssetRegistry;
use voter_telemetry::Metrics;

use crate::clock::Clock;
use crate::submit::{build_commit_batch, build_reveal_batch, AssetPipeline};

/// Reveal sub-loop poll interval.
const REVEAL_POLL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay after the submit window opens before committing, leaving
    /// room for fresh quotes to land.
    pub submit_offset_ms: i64,
    /// Delay after the submit deadline before the first reveal attempt.
    pub reveal_offset_ms: i64,
    pub commit_gas_limit: u64,
    pub reveal_gas_limit: u64,
    pub binding: CommitBinding,
}

pub struct SubmissionScheduler {
    clock: Arc<dyn Clock>,
    settings: EpochSettings,
    assets: Vec<AssetPipeline>,
    registry: Arc<AssetRegistry>,
    records: Arc<RecordStore>,
    queue: ActionQueue,
    sender: Arc<TxSender>,
    whitelist: Arc<WhitelistGuard>,
    /// Price submitter contract.
    submitter: Address,
    config: SchedulerConfig,
    symbols: Vec<String>,
}

impl SubmissionScheduler {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        settings: EpochSettings,
        assets: Vec<AssetPipeline>,
        registry: Arc<AssetRegistry>,
        records: Arc<RecordStore>,
        queue: ActionQueue,
        sender: Arc<TxSender>,
        whitelist: Arc<WhitelistGuard>,
        submitter: Address,
        config: SchedulerConfig,
    ) -> Self {
        let symbols = assets.iter().map(|a| a.symbol.clone()).collect();
        Self {
            clock,
            settings,
            assets,
            registry,
            records,
            queue,
            sender,
            whitelist,
            submitter,
            config,
            symbols,
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(assets = self.assets.len(), "submission scheduler started");
        loop {
            let now = self.clock.now_ms();
            let window = self.settings.window_at(now);
            let epoch = window.epoch_id;

            info!(
                epoch = epoch.0,
                submit_ends_in_ms = window.submit_period_end - now,
                reveal_ends_in_ms = window.reveal_period_end - now,
                "EPOCH DATA"
            );
            Metrics::current_epoch(epoch.0);

            // Reveal windows two epochs back have certainly elapsed.
            self.records.gc(EpochId(epoch.0.saturating_sub(2)));

            if self.registry.covers(&self.symbols) {
                let commit_at = window.submit_period_end - self.settings.submit_period_ms()
                    + self.config.submit_offset_ms;
                let reveal_at = window.submit_period_end + self.config.reveal_offset_ms;

                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.run_commit(epoch, commit_at).await;
                });
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.run_reveal(epoch, reveal_at).await;
                });
            } else {
                warn!(epoch = epoch.0, "asset discovery incomplete, skipping epoch");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("submission scheduler stopping");
                    return;
                }
                _ = self.sleep_until(window.submit_period_end) => {}
            }
        }
    }

    /// Commit task for one epoch: price all assets, hash, enqueue.
    async fn run_commit(self: Arc<Self>, epoch: EpochId, commit_at: i64) {
        self.sleep_until(commit_at).await;

        let bitmap = match self.whitelist.current_bitmap().await {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!(epoch = epoch.0, error = %e, "whitelist read failed, skipping epoch");
                return;
            }
        };

        let random_nonce = rand::thread_rng().gen::<u64>();
        let batch = build_commit_batch(
            epoch,
            &self.assets,
            &self.registry,
            &bitmap,
            self.sender.address(),
            self.config.binding,
            random_nonce,
            self.clock.now_ms(),
        )
        .await;

        if batch.is_empty() {
            info!(epoch = epoch.0, "nothing to commit");
            return;
        }

        for entry in &batch.entries {
            debug!(
                symbol = entry.symbol,
                epoch = epoch.0,
                price = %entry.price,
                units = entry.price_units,
                "committing"
            );
            self.records.insert(voter_core::CommitRevealRecord::new(
                entry.symbol.clone(),
                epoch,
                entry.price_units,
                batch.random_nonce,
            ));
            Metrics::commit_submitted(&entry.symbol);
        }

        let sender = Arc::clone(&self.sender);
        let records = Arc::clone(&self.records);
        let submitter = self.submitter;
        let gas_limit = self.config.commit_gas_limit;
        let indices = batch.indices();
        let hashes = batch.hashes();
        let symbols: Vec<String> = batch.entries.iter().map(|e| e.symbol.clone()).collect();

        self.queue.enqueue(format!("commit#{}", epoch.0), async move {
            sender
                .submit_price_hashes(submitter, epoch, &indices, &hashes, gas_limit)
                .await?;
            // The confirmation listener advances this too; advance_if
            // keeps the double observation harmless.
            for symbol in &symbols {
                records.advance_if(symbol, epoch, RevealPhase::Committing);
            }
            Ok(())
        });
    }

    /// Reveal task: poll until the commit is confirmed, then enqueue the
    /// reveal. Gives up when the reveal window closes.
    async fn run_reveal(self: Arc<Self>, epoch: EpochId, reveal_at: i64) {
        self.sleep_until(reveal_at).await;
        let reveal_deadline = self.settings.reveal_deadline(epoch);

        loop {
            if self.clock.now_ms() >= reveal_deadline {
                let pending = self.records.epoch_records(epoch);
                if !pending.is_empty() {
                    warn!(
                        epoch = epoch.0,
                        pending = pending.len(),
                        "reveal window closed with unrevealed records"
                    );
                }
                return;
            }

            if let Some(batch) = build_reveal_batch(epoch, &self.records, &self.registry) {
                for symbol in &batch.symbols {
                    self.records.advance_if(symbol, epoch, RevealPhase::Committed);
                    Metrics::reveal_submitted(symbol);
                }

                let sender = Arc::clone(&self.sender);
                let records = Arc::clone(&self.records);
                let submitter = self.submitter;
                let gas_limit = self.config.reveal_gas_limit;
                self.queue.enqueue(format!("reveal#{}", epoch.0), async move {
                    sender
                        .reveal_prices(
                            submitter,
                            epoch,
                            &batch.indices,
                            &batch.prices,
                            batch.random_nonce,
                            gas_limit,
                        )
                        .await?;
                    for symbol in &batch.symbols {
                        records.advance_if(symbol, epoch, RevealPhase::Revealing);
                    }
                    Ok(())
                });
                return;
            }

            tokio::time::sleep(Duration::from_millis(REVEAL_POLL_MS)).await;
        }
    }

    async fn sleep_until(&self, target_ms: i64) {
        let wait = target_ms - self.clock.now_ms();
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait as u64)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;

    #[test]
    fn test_commit_and_reveal_times() {
        // 180s submit, 90s reveal, first epoch at t=0.
        let settings = EpochSettings::new(0, 180_000, 90_000).unwrap();
        let clock = ManualClock::at(365_000);
        let window = settings.window_at(clock.now_ms());

        assert_eq!(window.epoch_id, EpochId(2));
        let commit_at = window.submit_period_end - 180_000 + 40_000;
        let reveal_at = window.submit_period_end + 2_000;
        assert_eq!(commit_at, 400_000);
        assert_eq!(reveal_at, 542_000);
        assert_eq!(settings.reveal_deadline(EpochId(2)), 630_000);
    }
}
