//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// No source, push or pull, yielded a usable price. Callers treat this
    /// as "skip the asset this epoch", never as fatal.
    #[error("no price available for {0}")]
    NoPriceAvailable(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("unknown price provider kind: {0}")]
    UnknownProvider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
