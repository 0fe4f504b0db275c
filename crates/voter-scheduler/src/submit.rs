//! Commit and reveal batch construction.
//!
//! Pure assembly: prices in, wire-ready index/hash/price vectors out.
//! An asset drops out of the batch when it has no usable price or the
//! voter is not whitelisted for it; the batch itself always survives.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use tracing::{debug, warn};

use voter_chain::WhitelistBitmap;
use voter_core::{commit_hash, CommitBinding, EpochId, Price, RecordStore, RevealPhase};
use voter_feed::{FeedError, PriceProvider};
use voter_registry::AssetRegistry;
use voter_telemetry::Metrics;

/// One asset's price pipeline, assembled at startup.
pub struct AssetPipeline {
    pub symbol: String,
    pub provider: Arc<dyn PriceProvider>,
    /// Scaling precision: prices go on the wire as floor(price * 10^decimals).
    pub decimals: u32,
}

/// One asset's contribution to a commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub symbol: String,
    pub index: u32,
    pub price: Price,
    pub price_units: u128,
    pub hash: B256,
}

/// All commitments for one epoch, sharing one random nonce.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub epoch: EpochId,
    pub random_nonce: u64,
    pub entries: Vec<CommitEntry>,
}

impl CommitBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.index).collect()
    }

    #[must_use]
    pub fn hashes(&self) -> Vec<B256> {
        self.entries.iter().map(|e| e.hash).collect()
    }
}

/// Reveal payload for one epoch, built from committed records.
#[derive(Debug, Clone)]
pub struct RevealBatch {
    pub epoch: EpochId,
    pub random_nonce: u64,
    pub symbols: Vec<String>,
    pub indices: Vec<u32>,
    pub prices: Vec<u128>,
}

/// Build the commit batch for `epoch`.
///
/// Per asset: resolve the submission index, drop it when the whitelist
/// bitmap does not authorize it, fetch a price, scale and hash. A failed
/// price fetch skips the asset with a warning; every other asset still
/// commits.
pub async fn build_commit_batch(
    epoch: EpochId,
    assets: &[AssetPipeline],
    registry: &AssetRegistry,
    bitmap: &WhitelistBitmap,
    voter: Address,
    binding: CommitBinding,
    random_nonce: u64,
    now_ms: i64,
) -> CommitBatch {
    let mut entries = Vec::with_capacity(assets.len());

    for asset in assets {
        let Some(index) = registry.index_of(&asset.symbol) else {
            warn!(symbol = asset.symbol, "asset missing from registry, skipping");
            continue;
        };
        if !bitmap.is_authorized(index) {
            debug!(symbol = asset.symbol, index, "not whitelisted, skipping");
            continue;
        }

        let price = match asset.provider.get_price(now_ms).await {
            Ok(price) => price,
            Err(FeedError::NoPriceAvailable(_)) => {
                warn!(symbol = asset.symbol, epoch = epoch.0, "no price, skipping epoch");
                Metrics::epoch_skipped(&asset.symbol);
                continue;
            }
            Err(e) => {
                warn!(symbol = asset.symbol, error = %e, "price fetch failed, skipping epoch");
                Metrics::epoch_skipped(&asset.symbol);
                continue;
            }
        };

        let price_units = match price.scale_to_units(asset.decimals) {
            Ok(units) => units,
            Err(e) => {
                warn!(symbol = asset.symbol, error = %e, "unscalable price, skipping epoch");
                Metrics::epoch_skipped(&asset.symbol);
                continue;
            }
        };

        entries.push(CommitEntry {
            symbol: asset.symbol.clone(),
            index,
            price,
            price_units,
            hash: commit_hash(price_units, random_nonce, voter, binding),
        });
    }

    CommitBatch {
        epoch,
        random_nonce,
        entries,
    }
}

/// Assemble the reveal payload from records whose commit is confirmed.
///
/// Returns `None` while nothing for this epoch has reached `Committed`;
/// the reveal sub-loop polls until it does or the window closes.
#[must_use]
pub fn build_reveal_batch(
    epoch: EpochId,
    records: &RecordStore,
    registry: &AssetRegistry,
) -> Option<RevealBatch> {
    let mut committed: Vec<_> = records
        .epoch_records(epoch)
        .into_iter()
        .filter(|r| r.phase == RevealPhase::Committed)
        .collect();
    if committed.is_empty() {
        return None;
    }
    committed.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut symbols = Vec::with_capacity(committed.len());
    let mut indices = Vec::with_capacity(committed.len());
    let mut prices = Vec::with_capacity(committed.len());
    let random_nonce = committed[0].random_nonce;

    for record in committed {
        let Some(index) = registry.index_of(&record.symbol) else {
            warn!(symbol = record.symbol, "committed asset missing from registry");
            continue;
        };
        symbols.push(record.symbol);
        indices.push(index);
        prices.push(record.committed_price);
    }
    if indices.is_empty() {
        return None;
    }

    Some(RevealBatch {
        epoch,
        random_nonce,
        symbols,
        indices,
        prices,
    })
}
