//! Transaction sequence ("nonce") cache.
//!
//! The cached value increments locally between network reads; a forced
//! refresh countdown bounds drift from externally-caused sequence
//! advances, and any non-revert transaction failure invalidates the cache
//! so the next use re-reads the network. Owned exclusively by the
//! transaction sender.

use alloy::primitives::Address;

use crate::error::ChainResult;
use crate::rpc::ChainRpc;

/// Locally cached account sequence number.
#[derive(Debug)]
pub struct SequenceCache {
    cached: Option<u64>,
    /// Local uses remaining before a forced network refresh.
    remaining: u32,
    refresh_every: u32,
    network_reads: u64,
}

impl SequenceCache {
    /// `refresh_every` = 1 forces a network read before every use.
    #[must_use]
    pub fn new(refresh_every: u32) -> Self {
        Self {
            cached: None,
            remaining: 0,
            refresh_every: refresh_every.max(1),
            network_reads: 0,
        }
    }

    /// Next sequence value to use for a transaction.
    ///
    /// # Errors
    /// Propagates the network read when a refresh is due.
    pub async fn next(&mut self, rpc: &dyn ChainRpc, address: Address) -> ChainResult<u64> {
        if self.remaining == 0 {
            self.cached = None;
        }
        match self.cached {
            Some(prev) => {
                let value = prev + 1;
                self.cached = Some(value);
                self.remaining -= 1;
                Ok(value)
            }
            None => {
                let value = rpc.transaction_count(address).await?;
                self.network_reads += 1;
                self.cached = Some(value);
                self.remaining = self.refresh_every - 1;
                Ok(value)
            }
        }
    }

    /// Drop the cached value; the next use re-reads the network.
    pub fn invalidate(&mut self) {
        self.cached = None;
        self.remaining = 0;
    }

    /// Number of network reads performed so far.
    #[must_use]
    pub fn network_reads(&self) -> u64 {
        self.network_reads
    }
}
