//! Voter whitelist checks and one-time whitelisting.
//!
//! The submitter contract tracks authorization per asset in a bitmap
//! keyed by voter address. Commits for assets the voter is not
//! authorized for would revert the whole batch, so asset indices are
//! filtered against the bitmap before every commit. Trusted addresses
//! bypass the whitelist entirely.

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

use crate::contracts;
use crate::error::{ChainError, ChainResult};
use crate::rpc::ChainRpc;
use crate::sender::TxSender;

/// Per-asset authorization bits for one voter, as read from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistBitmap(pub U256);

impl WhitelistBitmap {
    pub const EMPTY: Self = Self(U256::ZERO);

    #[must_use]
    pub fn is_authorized(&self, asset_index: u32) -> bool {
        self.0.bit(asset_index as usize)
    }

    #[must_use]
    pub fn any(&self) -> bool {
        !self.0.is_zero()
    }

    /// Keep only the indices this voter may submit for.
    #[must_use]
    pub fn filter_authorized(&self, indices: &[u32]) -> Vec<u32> {
        indices
            .iter()
            .copied()
            .filter(|i| self.is_authorized(*i))
            .collect()
    }
}

/// Whitelist policy for the running voter.
pub struct WhitelistGuard {
    rpc: Arc<dyn ChainRpc>,
    submitter: Address,
    voter: Address,
    /// Trusted addresses are authorized out of band and skip the bitmap.
    trusted: bool,
    /// Marker file recording that whitelisting was already requested, so
    /// restarts do not spend gas repeating it.
    marker_path: PathBuf,
}

impl WhitelistGuard {
    #[must_use]
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        submitter: Address,
        voter: Address,
        trusted: bool,
        marker_path: PathBuf,
    ) -> Self {
        Self {
            rpc,
            submitter,
            voter,
            trusted,
            marker_path,
        }
    }

    /// Read the current authorization bitmap from the chain. Trusted
    /// voters report all bits set.
    pub async fn current_bitmap(&self) -> ChainResult<WhitelistBitmap> {
        if self.trusted {
            return Ok(WhitelistBitmap(U256::MAX));
        }
        let calldata = contracts::encode_voter_whitelist_bitmap(self.voter);
        let result = self.rpc.call(self.submitter, calldata).await?;
        if result.len() != 32 {
            return Err(ChainError::Decode(format!(
                "whitelist bitmap: expected 32 bytes, got {}",
                result.len()
            )));
        }
        Ok(WhitelistBitmap(U256::from_be_slice(&result)))
    }

    /// Request whitelisting for every supported asset, once per
    /// deployment. Trusted voters and already-requested deployments are
    /// a no-op.
    pub async fn ensure_whitelisted(
        &self,
        sender: &TxSender,
        asset_indices: &[u32],
        gas_limit: u64,
    ) -> ChainResult<()> {
        if self.trusted {
            info!(voter = %self.voter, "trusted address, skipping whitelisting");
            return Ok(());
        }
        if self.marker_path.exists() {
            info!(
                marker = %self.marker_path.display(),
                "whitelisting already requested"
            );
            return Ok(());
        }

        info!(
            voter = %self.voter,
            assets = asset_indices.len(),
            "requesting whitelisting"
        );
        for &index in asset_indices {
            let calldata = contracts::encode_request_whitelisting(self.voter, index);
            if let Err(e) = sender
                .execute("request_whitelisting", self.submitter, calldata, gas_limit)
                .await
            {
                // Typically "voter not eligible" for some assets; the
                // bitmap read before each commit is authoritative.
                warn!(index, error = %e, "whitelisting request rejected");
            }
        }

        std::fs::write(&self.marker_path, b"requested\n")?;
        Ok(())
    }
}
