//! Scheduler error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Feed error: {0}")]
    Feed(#[from] voter_feed::FeedError),

    #[error("Chain error: {0}")]
    Chain(#[from] voter_chain::ChainError),

    #[error("Price scaling error: {0}")]
    Core(#[from] voter_core::CoreError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
