//! Commit-reveal lifecycle records.
//!
//! One record per (symbol, epoch) pair, created when a commit is built and
//! kept until the reveal completes or the epoch's reveal window elapses.
//! The phase machine is strictly forward-only.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::epoch::EpochId;

/// Lifecycle phase of one commitment, strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RevealPhase {
    Committing,
    Committed,
    Revealing,
    Revealed,
}

impl RevealPhase {
    /// The phase following this one.
    ///
    /// # Panics
    /// Advancing past `Revealed` is a programming error.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Committing => Self::Committed,
            Self::Committed => Self::Revealing,
            Self::Revealing => Self::Revealed,
            Self::Revealed => panic!("cannot advance past Revealed"),
        }
    }
}

impl std::fmt::Display for RevealPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committing => write!(f, "COMMITTING"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Revealing => write!(f, "REVEALING"),
            Self::Revealed => write!(f, "REVEALED"),
        }
    }
}

/// State recorded for one (symbol, epoch) commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRevealRecord {
    pub symbol: String,
    pub epoch_id: EpochId,
    /// Scaled integer price that was hashed into the commitment.
    pub committed_price: u128,
    /// Random nonce bound into the commitment hash.
    pub random_nonce: u64,
    pub phase: RevealPhase,
}

impl CommitRevealRecord {
    #[must_use]
    pub fn new(symbol: String, epoch_id: EpochId, committed_price: u128, random_nonce: u64) -> Self {
        Self {
            symbol,
            epoch_id,
            committed_price,
            random_nonce,
            phase: RevealPhase::Committing,
        }
    }

    /// Advance to the next lifecycle phase.
    pub fn advance(&mut self) -> RevealPhase {
        self.phase = self.phase.next();
        self.phase
    }
}

/// Key for the record store.
pub type RecordKey = (String, EpochId);

/// Shared store of live commit-reveal records.
///
/// The submission pipeline is the sole creator; the confirmation listener
/// advances phases as an integrity cross-check. At most one live record
/// per (symbol, epoch).
#[derive(Debug, Default)]
pub struct RecordStore {
    records: DashMap<RecordKey, CommitRevealRecord>,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record, replacing any stale one for the same key.
    pub fn insert(&self, record: CommitRevealRecord) {
        self.records
            .insert((record.symbol.clone(), record.epoch_id), record);
    }

    #[must_use]
    pub fn get(&self, symbol: &str, epoch_id: EpochId) -> Option<CommitRevealRecord> {
        self.records
            .get(&(symbol.to_string(), epoch_id))
            .map(|r| r.clone())
    }

    /// Advance the phase of the record for (symbol, epoch), if present.
    ///
    /// Returns the new phase, or `None` when no record exists.
    pub fn advance(&self, symbol: &str, epoch_id: EpochId) -> Option<RevealPhase> {
        self.records
            .get_mut(&(symbol.to_string(), epoch_id))
            .map(|mut r| r.advance())
    }

    /// Advance only when the record is currently in `expected`. Keeps
    /// phase advancement idempotent when both the submission pipeline and
    /// the confirmation listener observe the same transition.
    ///
    /// Returns the new phase, or `None` when absent or already past
    /// `expected`.
    pub fn advance_if(
        &self,
        symbol: &str,
        epoch_id: EpochId,
        expected: RevealPhase,
    ) -> Option<RevealPhase> {
        let mut entry = self.records.get_mut(&(symbol.to_string(), epoch_id))?;
        if entry.phase != expected {
            return None;
        }
        Some(entry.advance())
    }

    /// All records for one epoch, in no particular order.
    #[must_use]
    pub fn epoch_records(&self, epoch_id: EpochId) -> Vec<CommitRevealRecord> {
        self.records
            .iter()
            .filter(|e| e.key().1 == epoch_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Drop records for epochs at or below `up_to` (reveal window elapsed).
    pub fn gc(&self, up_to: EpochId) {
        self.records.retain(|(_, epoch), _| *epoch > up_to);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
