//! Chain error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or node-side failure (timeout, malformed response,
    /// sequence conflict). Invalidates the sequence cache.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The receiving contract explicitly rejected the call. Expected and
    /// benign (e.g. submitting for an already-closed epoch), never retried.
    #[error("reverted: {reason}")]
    Reverted { reason: String },

    /// The account's sequence counter did not advance within the bounded
    /// backoff window after broadcast.
    #[error("finalization timeout after {attempts} polls (nonce {nonce})")]
    FinalizeTimeout { nonce: u64, attempts: u32 },

    #[error("signing error: {0}")]
    Signing(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// Whether this failure class invalidates the cached sequence number.
    #[must_use]
    pub fn invalidates_sequence(&self) -> bool {
        !matches!(self, Self::Reverted { .. })
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
