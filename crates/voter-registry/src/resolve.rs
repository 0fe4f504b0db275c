//! Startup chain resolution.
//!
//! One read-only pass against the oracle manager contract, run before
//! any epoch work starts. Everything resolved here is immutable for the
//! lifetime of the process.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use tracing::info;

use voter_chain::contracts::IOracleManager;
use voter_chain::ChainRpc;
use voter_core::EpochSettings;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::AssetRegistry;

/// Everything the voter learns from the chain at startup.
#[derive(Debug)]
pub struct ChainResolution {
    pub submitter: Address,
    pub settings: EpochSettings,
    pub registry: Arc<AssetRegistry>,
    pub chain_id: u64,
}

/// Resolve submitter address, asset registry and epoch timing through
/// the oracle manager.
///
/// # Errors
/// Fails when any call or decode fails, or when a configured symbol is
/// not in the oracle's supported set. Callers are expected to abort on
/// failure rather than retry.
pub async fn resolve_chain(
    rpc: &dyn ChainRpc,
    oracle_manager: Address,
    configured_symbols: &[String],
) -> RegistryResult<ChainResolution> {
    let chain_id = rpc.chain_id().await?;

    let ret = rpc
        .call(oracle_manager, IOracleManager::getPriceSubmitterCall {}.abi_encode())
        .await?;
    let submitter = IOracleManager::getPriceSubmitterCall::abi_decode_returns(&ret, true)
        .map_err(|e| RegistryError::Decode(format!("getPriceSubmitter: {e}")))?
        ._0;

    let ret = rpc
        .call(
            oracle_manager,
            IOracleManager::getSupportedIndicesAndSymbolsCall {}.abi_encode(),
        )
        .await?;
    let supported =
        IOracleManager::getSupportedIndicesAndSymbolsCall::abi_decode_returns(&ret, true)
            .map_err(|e| RegistryError::Decode(format!("getSupportedIndicesAndSymbols: {e}")))?;
    if supported.indices.len() != supported.symbols.len() {
        return Err(RegistryError::Decode(format!(
            "index/symbol length mismatch: {} vs {}",
            supported.indices.len(),
            supported.symbols.len()
        )));
    }

    let registry = Arc::new(AssetRegistry::new());
    for (index, symbol) in supported.indices.iter().zip(supported.symbols.iter()) {
        let index = u32::try_from(*index)
            .map_err(|_| RegistryError::Decode(format!("asset index out of range: {index}")))?;
        registry.insert(symbol.clone(), index);
    }
    for symbol in configured_symbols {
        if registry.index_of(symbol).is_none() {
            return Err(RegistryError::UnsupportedAsset(symbol.clone()));
        }
    }

    let ret = rpc
        .call(
            oracle_manager,
            IOracleManager::getPriceEpochConfigurationCall {}.abi_encode(),
        )
        .await?;
    let config = IOracleManager::getPriceEpochConfigurationCall::abi_decode_returns(&ret, true)
        .map_err(|e| RegistryError::Decode(format!("getPriceEpochConfiguration: {e}")))?;

    // Contract timing is in seconds; the client works in milliseconds.
    let settings = EpochSettings::new(
        seconds_to_ms(config.firstEpochStartTs)?,
        seconds_to_ms(config.submitPeriodSeconds)?,
        seconds_to_ms(config.revealPeriodSeconds)?,
    )?;

    info!(
        chain_id,
        submitter = %submitter,
        assets = registry.len(),
        "chain resolution complete"
    );

    Ok(ChainResolution {
        submitter,
        settings,
        registry,
        chain_id,
    })
}

fn seconds_to_ms(v: alloy::primitives::U256) -> RegistryResult<i64> {
    let secs = i64::try_from(v)
        .map_err(|_| RegistryError::Decode(format!("timestamp out of range: {v}")))?;
    secs.checked_mul(1000)
        .ok_or_else(|| RegistryError::Decode(format!("timestamp out of range: {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use voter_chain::{BoxFuture, ChainResult, LogEntry};

    /// Stub node answering the three resolution calls by selector.
    struct StubManager;

    impl ChainRpc for StubManager {
        fn transaction_count(&self, _address: Address) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(0) })
        }
        fn send_raw_transaction(&self, _raw: Vec<u8>) -> BoxFuture<'_, ChainResult<B256>> {
            Box::pin(async { Ok(B256::ZERO) })
        }
        fn transaction_receipt(&self, _hash: B256) -> BoxFuture<'_, ChainResult<Option<bool>>> {
            Box::pin(async { Ok(None) })
        }
        fn call(&self, _to: Address, data: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
            let selector: [u8; 4] = data[..4].try_into().unwrap();
            let ret = if selector == IOracleManager::getPriceSubmitterCall::SELECTOR {
                IOracleManager::getPriceSubmitterCall::abi_encode_returns(&(
                    Address::repeat_byte(0xaa),
                ))
            } else if selector == IOracleManager::getSupportedIndicesAndSymbolsCall::SELECTOR {
                IOracleManager::getSupportedIndicesAndSymbolsCall::abi_encode_returns(&(
                    vec![U256::from(0u64), U256::from(1u64), U256::from(2u64)],
                    vec!["XRP".to_string(), "LTC".to_string(), "BTC".to_string()],
                ))
            } else if selector == IOracleManager::getPriceEpochConfigurationCall::SELECTOR {
                IOracleManager::getPriceEpochConfigurationCall::abi_encode_returns(&(
                    U256::from(1_600_000_000u64),
                    U256::from(180u64),
                    U256::from(90u64),
                ))
            } else {
                panic!("unexpected call");
            };
            Box::pin(async move { Ok(ret) })
        }
        fn get_logs(
            &self,
            _address: Address,
            _from: u64,
            _to: u64,
        ) -> BoxFuture<'_, ChainResult<Vec<LogEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(0) })
        }
        fn chain_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(16) })
        }
    }

    #[tokio::test]
    async fn test_resolution_populates_everything() {
        let resolution = resolve_chain(
            &StubManager,
            Address::repeat_byte(1),
            &["XRP".to_string(), "BTC".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(resolution.chain_id, 16);
        assert_eq!(resolution.submitter, Address::repeat_byte(0xaa));
        assert_eq!(resolution.registry.index_of("XRP"), Some(0));
        assert_eq!(resolution.registry.index_of("BTC"), Some(2));
        // 180s submit period, in ms.
        assert_eq!(
            resolution.settings.submit_deadline(voter_core::EpochId(0)),
            1_600_000_000_000 + 180_000
        );
    }

    #[tokio::test]
    async fn test_unsupported_configured_symbol_fails() {
        let err = resolve_chain(
            &StubManager,
            Address::repeat_byte(1),
            &["DOGE".to_string()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedAsset(s) if s == "DOGE"));
    }
}
