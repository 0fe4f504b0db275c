//! Price provider construction.
//!
//! Providers are instantiated from a configuration-supplied kind string
//! resolved against a static registry of known implementations, validated
//! at load time so unknown identifiers fail fast rather than at first use.

use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use voter_core::Price;

use crate::aggregator::{CombinePolicy, ConversionMode, FeedSource, PriceAggregator};
use crate::error::{FeedError, FeedResult};
use crate::rest::{BoxFuture, PullSource};
use crate::venue::{FeedRegistry, VenueKind};

/// A source of prices for one asset.
pub trait PriceProvider: Send + Sync {
    fn symbol(&self) -> &str;
    fn get_price(&self, now_ms: i64) -> BoxFuture<'_, FeedResult<Price>>;
}

impl PriceProvider for PriceAggregator {
    fn symbol(&self) -> &str {
        PriceAggregator::symbol(self)
    }

    fn get_price(&self, now_ms: i64) -> BoxFuture<'_, FeedResult<Price>> {
        self.get_price_boxed(now_ms)
    }
}

/// Uniform random prices in a fixed range, for dry runs and tests.
pub struct RandomPriceProvider {
    symbol: String,
    min: u64,
    max: u64,
}

impl RandomPriceProvider {
    #[must_use]
    pub fn new(symbol: impl Into<String>, min: u64, max: u64) -> Self {
        Self {
            symbol: symbol.into(),
            min,
            max,
        }
    }
}

impl PriceProvider for RandomPriceProvider {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn get_price(&self, _now_ms: i64) -> BoxFuture<'_, FeedResult<Price>> {
        let value = rand::thread_rng().gen_range(self.min..=self.max);
        Box::pin(async move { Ok(Price::new(value.into())) })
    }
}

/// One push source in a provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub venue: String,
    pub pair: String,
}

/// Provider configuration for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Known kinds: `aggregated`, `random`.
    pub kind: String,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub policy: CombinePolicy,
    /// Staleness window for push quotes.
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: i64,
}

fn default_staleness_ms() -> i64 {
    180_000
}

/// Validate a provider spec without constructing it (load-time check).
pub fn validate_spec(spec: &ProviderSpec) -> FeedResult<()> {
    match spec.kind.as_str() {
        "random" => Ok(()),
        "aggregated" => {
            if spec.sources.is_empty() {
                return Err(FeedError::Parse(
                    "aggregated provider requires at least one source".to_string(),
                ));
            }
            for s in &spec.sources {
                VenueKind::from_str(&s.venue)?;
            }
            Ok(())
        }
        other => Err(FeedError::UnknownProvider(other.to_string())),
    }
}

/// Build the provider for one asset.
///
/// `reference` attaches the quote-currency conversion step to aggregated
/// providers; it is ignored for `random`.
pub fn build_provider(
    symbol: &str,
    spec: &ProviderSpec,
    registry: &FeedRegistry,
    pull: Arc<dyn PullSource>,
    reference: Option<(Arc<PriceAggregator>, ConversionMode)>,
) -> FeedResult<Arc<dyn PriceProvider>> {
    validate_spec(spec)?;
    match spec.kind.as_str() {
        "random" => Ok(Arc::new(RandomPriceProvider::new(symbol, 1, 5))),
        "aggregated" => {
            let sources = spec
                .sources
                .iter()
                .map(|s| {
                    let venue = VenueKind::from_str(&s.venue)?;
                    Ok(FeedSource {
                        venue,
                        pair: s.pair.clone(),
                        slot: registry.subscribe(venue, &s.pair),
                        staleness_ms: spec.staleness_ms,
                    })
                })
                .collect::<FeedResult<Vec<_>>>()?;

            let mut aggregator = PriceAggregator::new(symbol, sources, spec.policy, pull);
            if let Some((reference, mode)) = reference {
                aggregator = aggregator.with_conversion(reference, mode);
            }
            Ok(Arc::new(aggregator))
        }
        other => Err(FeedError::UnknownProvider(other.to_string())),
    }
}

/// Build a bare aggregator (used for the reference asset itself).
pub fn build_aggregator(
    symbol: &str,
    spec: &ProviderSpec,
    registry: &FeedRegistry,
    pull: Arc<dyn PullSource>,
) -> FeedResult<Arc<PriceAggregator>> {
    validate_spec(spec)?;
    if spec.kind != "aggregated" {
        return Err(FeedError::UnknownProvider(format!(
            "reference provider must be aggregated, got {}",
            spec.kind
        )));
    }
    let sources = spec
        .sources
        .iter()
        .map(|s| {
            let venue = VenueKind::from_str(&s.venue)?;
            Ok(FeedSource {
                venue,
                pair: s.pair.clone(),
                slot: registry.subscribe(venue, &s.pair),
                staleness_ms: spec.staleness_ms,
            })
        })
        .collect::<FeedResult<Vec<_>>>()?;
    Ok(Arc::new(PriceAggregator::new(
        symbol, sources, spec.policy, pull,
    )))
}
