//! Application configuration.

use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use voter_core::CommitBinding;
use voter_feed::{validate_spec, ConversionMode, FeedConfig, ProviderSpec};

use crate::error::{AppError, AppResult};

/// Environment variable consulted when `account_key` is absent from the
/// config file.
pub const ACCOUNT_KEY_ENV: &str = "VOTER_ACCOUNT_KEY";

/// One voted asset: symbol, wire precision and its price provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    /// Prices go on the wire as floor(price * 10^decimals).
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    pub provider: ProviderSpec,
}

fn default_decimals() -> u32 {
    5
}

/// Quote-currency reference (e.g. a USDT/USD aggregator) applied to every
/// aggregated asset provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub symbol: String,
    pub provider: ProviderSpec,
    pub conversion: ConversionMode,
}

/// Chain connectivity and transaction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Oracle manager contract; everything else is resolved from it.
    pub oracle_manager: String,
    /// Hex-encoded account key. Prefer the environment variable.
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default = "default_gas_price_wei")]
    pub gas_price_wei: u128,
    #[serde(default = "default_commit_gas_limit")]
    pub commit_gas_limit: u64,
    #[serde(default = "default_reveal_gas_limit")]
    pub reveal_gas_limit: u64,
    #[serde(default = "default_whitelist_gas_limit")]
    pub whitelist_gas_limit: u64,
    /// Sequence cache refresh countdown; 1 reads the network every job.
    #[serde(default = "default_sequence_refresh_every")]
    pub sequence_refresh_every: u32,
    /// Trusted submitters bypass the whitelist entirely.
    #[serde(default)]
    pub trusted: bool,
    #[serde(default = "default_whitelist_marker")]
    pub whitelist_marker: String,
    #[serde(default = "default_listener_poll_ms")]
    pub listener_poll_ms: u64,
    #[serde(default)]
    pub finalize: FinalizeSettings,
}

fn default_gas_price_wei() -> u128 {
    225_000_000_000
}

fn default_commit_gas_limit() -> u64 {
    2_500_000
}

fn default_reveal_gas_limit() -> u64 {
    2_500_000
}

fn default_whitelist_gas_limit() -> u64 {
    2_500_000
}

fn default_sequence_refresh_every() -> u32 {
    100
}

fn default_whitelist_marker() -> String {
    ".voter-whitelisted".to_string()
}

fn default_listener_poll_ms() -> u64 {
    3000
}

/// Finalization polling (broadcast to confirmed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeSettings {
    #[serde(default = "default_finalize_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_finalize_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_finalize_max_retries")]
    pub max_retries: u32,
}

fn default_finalize_base_delay_ms() -> u64 {
    1000
}

fn default_finalize_multiplier() -> f64 {
    1.5
}

fn default_finalize_max_retries() -> u32 {
    8
}

impl Default for FinalizeSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_finalize_base_delay_ms(),
            multiplier: default_finalize_multiplier(),
            max_retries: default_finalize_max_retries(),
        }
    }
}

/// Epoch timing offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Delay into the submit window before committing.
    #[serde(default = "default_submit_offset_ms")]
    pub submit_offset_ms: i64,
    /// Delay past the submit deadline before the first reveal attempt.
    #[serde(default = "default_reveal_offset_ms")]
    pub reveal_offset_ms: i64,
    #[serde(default)]
    pub binding: CommitBinding,
}

fn default_submit_offset_ms() -> i64 {
    40_000
}

fn default_reveal_offset_ms() -> i64 {
    2_000
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            submit_offset_ms: default_submit_offset_ms(),
            reveal_offset_ms: default_reveal_offset_ms(),
            binding: CommitBinding::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub reference: Option<ReferenceConfig>,
}

impl AppConfig {
    /// Load and validate from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast structural validation, run before anything connects.
    pub fn validate(&self) -> AppResult<()> {
        if self.chain.rpc_url.is_empty() {
            return Err(AppError::Config("chain.rpc_url must be set".to_string()));
        }
        self.oracle_manager()?;

        if self.assets.is_empty() {
            return Err(AppError::Config(
                "at least one asset must be configured".to_string(),
            ));
        }
        for asset in &self.assets {
            if asset.decimals > 18 {
                return Err(AppError::Config(format!(
                    "{}: decimals must be <= 18, got {}",
                    asset.symbol, asset.decimals
                )));
            }
            validate_spec(&asset.provider).map_err(|e| {
                AppError::Config(format!("{}: invalid provider: {e}", asset.symbol))
            })?;
        }
        if let Some(reference) = &self.reference {
            validate_spec(&reference.provider).map_err(|e| {
                AppError::Config(format!("reference {}: invalid provider: {e}", reference.symbol))
            })?;
        }

        if self.scheduling.submit_offset_ms <= 0 {
            return Err(AppError::Config(
                "scheduling.submit_offset_ms must be positive".to_string(),
            ));
        }
        if self.scheduling.reveal_offset_ms <= 0 {
            return Err(AppError::Config(
                "scheduling.reveal_offset_ms must be positive".to_string(),
            ));
        }
        if self.chain.sequence_refresh_every == 0 {
            return Err(AppError::Config(
                "chain.sequence_refresh_every must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed oracle manager address.
    pub fn oracle_manager(&self) -> AppResult<Address> {
        Address::from_str(&self.chain.oracle_manager).map_err(|e| {
            AppError::Config(format!(
                "chain.oracle_manager is not a valid address: {e}"
            ))
        })
    }

    /// Account key bytes from config or environment, zeroized on drop.
    pub fn account_key(&self) -> AppResult<Zeroizing<Vec<u8>>> {
        let raw = match &self.chain.account_key {
            Some(key) => key.clone(),
            None => std::env::var(ACCOUNT_KEY_ENV).map_err(|_| {
                AppError::Config(format!(
                    "account key missing: set chain.account_key or {ACCOUNT_KEY_ENV}"
                ))
            })?,
        };
        let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
        let bytes = hex::decode(stripped)
            .map_err(|e| AppError::Config(format!("account key is not valid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(AppError::Config(format!(
                "account key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Zeroizing::new(bytes))
    }

    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }
}
