//! Latest-quote slots.
//!
//! Each (venue, pair) feed owns exactly one `QuoteSlot`: the venue task is
//! the sole writer, the aggregator the sole reader. A quote is superseded
//! whenever a fresher one arrives and ignored once older than the
//! configured staleness window.

use parking_lot::RwLock;
use voter_core::Price;

/// A single observation from one market data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Source identifier, e.g. `binance:BTCUSDT`.
    pub source_id: String,
    pub price: Price,
    /// Unix milliseconds at which the tick was received.
    pub observed_at_ms: i64,
}

/// Typed per-source aggregation outcome, so the fallback decision is
/// inspectable without network calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Fresh(Price),
    Stale,
    Unavailable,
}

/// Read-mostly slot holding the latest quote from one feed.
#[derive(Debug, Default)]
pub struct QuoteSlot {
    latest: RwLock<Option<PriceQuote>>,
}

impl QuoteSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the owning venue task on every tick.
    pub fn store(&self, quote: PriceQuote) {
        *self.latest.write() = Some(quote);
    }

    #[must_use]
    pub fn load(&self) -> Option<PriceQuote> {
        self.latest.read().clone()
    }

    /// Classify the slot content against the staleness window.
    #[must_use]
    pub fn outcome(&self, now_ms: i64, staleness_ms: i64) -> SourceOutcome {
        match self.load() {
            Some(q) if now_ms - q.observed_at_ms <= staleness_ms => SourceOutcome::Fresh(q.price),
            Some(_) => SourceOutcome::Stale,
            None => SourceOutcome::Unavailable,
        }
    }
}
