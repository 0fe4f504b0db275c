//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Asset not supported by the oracle: {0}")]
    UnsupportedAsset(String),

    #[error("Resolution decode error: {0}")]
    Decode(String),

    #[error("Chain error: {0}")]
    Chain(#[from] voter_chain::ChainError),

    #[error("Invalid epoch configuration: {0}")]
    EpochConfig(#[from] voter_core::CoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
