//! Core domain types for the commit-reveal price voter.
//!
//! This crate provides the fundamental types used throughout the client:
//! - `EpochSettings`: wall-clock to epoch arithmetic
//! - `Price`: precision-safe venue prices with integer scaling
//! - `CommitRevealRecord`: per (symbol, epoch) lifecycle state machine
//! - `commit_hash`: the keccak-256 commitment over price and nonce

pub mod commitment;
pub mod decimal;
pub mod epoch;
pub mod error;
pub mod record;

pub use commitment::{commit_hash, CommitBinding};
pub use decimal::Price;
pub use epoch::{EpochId, EpochSettings, EpochWindow};
pub use error::{CoreError, Result};
pub use record::{CommitRevealRecord, RecordKey, RecordStore, RevealPhase};
