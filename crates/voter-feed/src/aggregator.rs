//! Per-asset price aggregation.
//!
//! Policy, evaluated in order: fresh push quotes, then the pull fallback,
//! then an optional quote-currency conversion via a reference aggregator
//! (itself an aggregator, tracking e.g. stablecoin/fiat).

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voter_core::Price;
use voter_telemetry::Metrics;

use crate::error::{FeedError, FeedResult};
use crate::quote::{QuoteSlot, SourceOutcome};
use crate::rest::{BoxFuture, PullSource};
use crate::venue::VenueKind;

/// How fresh quotes from multiple sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// First available fresh quote, in configured source order.
    #[default]
    First,
    /// Arithmetic mean of all fresh quotes.
    Average,
}

/// When the reference conversion rate is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConversionMode {
    /// Multiply by the reference rate unconditionally.
    Always,
    /// Only when the rate deviates from 1.0 beyond `tolerance`.
    WhenDeviates { tolerance: Decimal },
}

/// One subscribed push source for an asset.
pub struct FeedSource {
    pub venue: VenueKind,
    pub pair: String,
    pub slot: Arc<QuoteSlot>,
    /// Quotes older than this are discarded.
    pub staleness_ms: i64,
}

struct Conversion {
    reference: Arc<PriceAggregator>,
    mode: ConversionMode,
}

/// Produces a single price estimate for one asset on demand.
pub struct PriceAggregator {
    symbol: String,
    sources: Vec<FeedSource>,
    policy: CombinePolicy,
    pull: Arc<dyn PullSource>,
    conversion: Option<Conversion>,
}

impl PriceAggregator {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        sources: Vec<FeedSource>,
        policy: CombinePolicy,
        pull: Arc<dyn PullSource>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sources,
            policy,
            pull,
            conversion: None,
        }
    }

    /// Attach a quote-currency conversion step backed by `reference`
    /// (e.g. a stablecoin/fiat aggregator).
    #[must_use]
    pub fn with_conversion(mut self, reference: Arc<PriceAggregator>, mode: ConversionMode) -> Self {
        self.conversion = Some(Conversion { reference, mode });
        self
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Typed outcome per source, for inspection and tests.
    #[must_use]
    pub fn source_outcomes(&self, now_ms: i64) -> Vec<(String, SourceOutcome)> {
        self.sources
            .iter()
            .map(|s| {
                (
                    format!("{}:{}", s.venue, s.pair),
                    s.slot.outcome(now_ms, s.staleness_ms),
                )
            })
            .collect()
    }

    /// Produce the current price estimate.
    ///
    /// # Errors
    /// `FeedError::NoPriceAvailable` when neither push nor pull yields a
    /// usable number. Callers skip the asset this epoch.
    pub async fn get_price(&self, now_ms: i64) -> FeedResult<Price> {
        let fresh = self
            .sources
            .iter()
            .filter(|s| matches!(s.slot.outcome(now_ms, s.staleness_ms), SourceOutcome::Fresh(_)))
            .count();
        Metrics::fresh_sources(&self.symbol, fresh);

        let raw = match self.combine_push(now_ms) {
            Some(price) => price,
            None => self.pull_fallback().await?,
        };
        self.convert(raw, now_ms).await
    }

    /// Boxed form of [`get_price`], used by the conversion step.
    pub fn get_price_boxed(&self, now_ms: i64) -> BoxFuture<'_, FeedResult<Price>> {
        Box::pin(self.get_price(now_ms))
    }

    fn combine_push(&self, now_ms: i64) -> Option<Price> {
        match self.policy {
            CombinePolicy::First => self.sources.iter().find_map(|s| {
                match s.slot.outcome(now_ms, s.staleness_ms) {
                    SourceOutcome::Fresh(p) => Some(p),
                    _ => None,
                }
            }),
            CombinePolicy::Average => {
                let fresh: Vec<Decimal> = self
                    .sources
                    .iter()
                    .filter_map(|s| match s.slot.outcome(now_ms, s.staleness_ms) {
                        SourceOutcome::Fresh(p) => Some(p.inner()),
                        _ => None,
                    })
                    .collect();
                mean(&fresh).map(Price::new)
            }
        }
    }

    async fn pull_fallback(&self) -> FeedResult<Price> {
        match self.policy {
            CombinePolicy::First => {
                for s in &self.sources {
                    match self.pull.fetch(s.venue, &s.pair).await {
                        Ok(price) => {
                            warn!(
                                symbol = %self.symbol,
                                venue = %s.venue,
                                %price,
                                "no fresh push quote, price from REST call"
                            );
                            return Ok(price);
                        }
                        Err(e) => {
                            debug!(symbol = %self.symbol, venue = %s.venue, error = %e, "pull failed");
                        }
                    }
                }
                Err(FeedError::NoPriceAvailable(self.symbol.clone()))
            }
            CombinePolicy::Average => {
                let mut values = Vec::new();
                for s in &self.sources {
                    match self.pull.fetch(s.venue, &s.pair).await {
                        Ok(price) => values.push(price.inner()),
                        Err(e) => {
                            debug!(symbol = %self.symbol, venue = %s.venue, error = %e, "pull failed");
                        }
                    }
                }
                mean(&values)
                    .map(Price::new)
                    .ok_or_else(|| FeedError::NoPriceAvailable(self.symbol.clone()))
            }
        }
    }

    async fn convert(&self, raw: Price, now_ms: i64) -> FeedResult<Price> {
        let Some(conversion) = &self.conversion else {
            return Ok(raw);
        };

        // A missing reference rate means the raw price is in the wrong
        // currency; skip the asset rather than submit an unconverted value.
        let rate = conversion.reference.get_price_boxed(now_ms).await?;

        let apply = match conversion.mode {
            ConversionMode::Always => true,
            ConversionMode::WhenDeviates { tolerance } => {
                (rate.inner() - Decimal::ONE).abs() > tolerance
            }
        };
        if apply {
            debug!(symbol = %self.symbol, %rate, "applying reference conversion");
            Ok(raw * rate.inner())
        } else {
            Ok(raw)
        }
    }
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::PriceQuote;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000_000;
    const STALENESS: i64 = 180_000;

    /// Pull source backed by a fixed map, recording call order.
    struct MockPull {
        responses: HashMap<(VenueKind, String), Price>,
        calls: Mutex<Vec<VenueKind>>,
    }

    impl MockPull {
        fn new(responses: Vec<(VenueKind, &str, Decimal)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(v, p, d)| ((v, p.to_string()), Price::new(d)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    impl PullSource for MockPull {
        fn fetch(&self, venue: VenueKind, pair: &str) -> BoxFuture<'_, FeedResult<Price>> {
            let key = (venue, pair.to_string());
            let pair = pair.to_string();
            Box::pin(async move {
                self.calls.lock().push(venue);
                self.responses
                    .get(&key)
                    .copied()
                    .ok_or_else(|| FeedError::NoPriceAvailable(pair))
            })
        }
    }

    fn source(venue: VenueKind, pair: &str, fresh_price: Option<Decimal>) -> FeedSource {
        let slot = Arc::new(QuoteSlot::new());
        if let Some(price) = fresh_price {
            slot.store(PriceQuote {
                source_id: format!("{venue}:{pair}"),
                price: Price::new(price),
                observed_at_ms: NOW - 1000,
            });
        }
        FeedSource {
            venue,
            pair: pair.to_string(),
            slot,
            staleness_ms: STALENESS,
        }
    }

    fn stale_source(venue: VenueKind, pair: &str, price: Decimal) -> FeedSource {
        let s = source(venue, pair, None);
        s.slot.store(PriceQuote {
            source_id: format!("{venue}:{pair}"),
            price: Price::new(price),
            observed_at_ms: NOW - STALENESS - 1,
        });
        s
    }

    #[tokio::test]
    async fn test_average_policy() {
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                source(VenueKind::Binance, "BTCUSDT", Some(dec!(10.0))),
                source(VenueKind::Kraken, "XBT/USD", Some(dec!(12.0))),
            ],
            CombinePolicy::Average,
            Arc::new(MockPull::empty()),
        );
        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(11.0)));
    }

    #[tokio::test]
    async fn test_first_policy_takes_configured_order() {
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                source(VenueKind::Binance, "BTCUSDT", Some(dec!(10.0))),
                source(VenueKind::Kraken, "XBT/USD", Some(dec!(12.0))),
            ],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        );
        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(10.0)));
    }

    #[tokio::test]
    async fn test_first_skips_stale_source() {
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                stale_source(VenueKind::Binance, "BTCUSDT", dec!(10.0)),
                source(VenueKind::Kraken, "XBT/USD", Some(dec!(12.0))),
            ],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        );
        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(12.0)));
    }

    #[tokio::test]
    async fn test_pull_fallback_first_stops_at_first_answer() {
        let pull = Arc::new(MockPull::new(vec![
            (VenueKind::Kraken, "XBT/USD", dec!(99.0)),
        ]));
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                stale_source(VenueKind::Binance, "BTCUSDT", dec!(1.0)),
                source(VenueKind::Kraken, "XBT/USD", None),
            ],
            CombinePolicy::First,
            Arc::clone(&pull) as Arc<dyn PullSource>,
        );
        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(99.0)));
        // Binance was tried first and failed before Kraken answered.
        assert_eq!(
            *pull.calls.lock(),
            vec![VenueKind::Binance, VenueKind::Kraken]
        );
    }

    #[tokio::test]
    async fn test_pull_fallback_average_queries_all() {
        let pull = Arc::new(MockPull::new(vec![
            (VenueKind::Binance, "BTCUSDT", dec!(10.0)),
            (VenueKind::Kraken, "XBT/USD", dec!(14.0)),
        ]));
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                source(VenueKind::Binance, "BTCUSDT", None),
                source(VenueKind::Kraken, "XBT/USD", None),
            ],
            CombinePolicy::Average,
            pull,
        );
        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(12.0)));
    }

    #[tokio::test]
    async fn test_no_price_available() {
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                stale_source(VenueKind::Binance, "BTCUSDT", dec!(10.0)),
                source(VenueKind::Kraken, "XBT/USD", None),
            ],
            CombinePolicy::Average,
            Arc::new(MockPull::empty()),
        );
        assert!(matches!(
            agg.get_price(NOW).await,
            Err(FeedError::NoPriceAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_source_outcomes_are_typed() {
        let agg = PriceAggregator::new(
            "BTC",
            vec![
                source(VenueKind::Binance, "BTCUSDT", Some(dec!(10.0))),
                stale_source(VenueKind::Kraken, "XBT/USD", dec!(11.0)),
                source(VenueKind::Coinbase, "BTC-USD", None),
            ],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        );
        let outcomes = agg.source_outcomes(NOW);
        assert_eq!(outcomes[0].1, SourceOutcome::Fresh(Price::new(dec!(10.0))));
        assert_eq!(outcomes[1].1, SourceOutcome::Stale);
        assert_eq!(outcomes[2].1, SourceOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_fresh_source_gauge_tracks_last_build() {
        let agg = PriceAggregator::new(
            "FIL",
            vec![
                source(VenueKind::Binance, "FILUSDT", Some(dec!(5.0))),
                stale_source(VenueKind::Kraken, "FIL/USD", dec!(5.1)),
            ],
            CombinePolicy::Average,
            Arc::new(MockPull::empty()),
        );
        agg.get_price(NOW).await.unwrap();
        let gauge = voter_telemetry::metrics::FRESH_SOURCES.with_label_values(&["FIL"]);
        assert_eq!(gauge.get(), 1.0);
    }

    #[tokio::test]
    async fn test_conversion_always() {
        let reference = Arc::new(PriceAggregator::new(
            "USDT",
            vec![source(VenueKind::Kraken, "USDT/USD", Some(dec!(0.5)))],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        ));
        let agg = PriceAggregator::new(
            "BTC",
            vec![source(VenueKind::Binance, "BTCUSDT", Some(dec!(100.0)))],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        )
        .with_conversion(reference, ConversionMode::Always);

        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(50.0)));
    }

    #[tokio::test]
    async fn test_conversion_within_tolerance_not_applied() {
        let reference = Arc::new(PriceAggregator::new(
            "USDT",
            vec![source(VenueKind::Kraken, "USDT/USD", Some(dec!(1.001)))],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        ));
        let agg = PriceAggregator::new(
            "BTC",
            vec![source(VenueKind::Binance, "BTCUSDT", Some(dec!(100.0)))],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        )
        .with_conversion(
            reference,
            ConversionMode::WhenDeviates {
                tolerance: dec!(0.005),
            },
        );

        assert_eq!(agg.get_price(NOW).await.unwrap(), Price::new(dec!(100.0)));
    }

    #[tokio::test]
    async fn test_conversion_reference_unavailable_propagates() {
        let reference = Arc::new(PriceAggregator::new(
            "USDT",
            vec![source(VenueKind::Kraken, "USDT/USD", None)],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        ));
        let agg = PriceAggregator::new(
            "BTC",
            vec![source(VenueKind::Binance, "BTCUSDT", Some(dec!(100.0)))],
            CombinePolicy::First,
            Arc::new(MockPull::empty()),
        )
        .with_conversion(reference, ConversionMode::Always);

        assert!(matches!(
            agg.get_price(NOW).await,
            Err(FeedError::NoPriceAvailable(_))
        ));
    }
}
