//! Market data aggregation for the commit-reveal price voter.
//!
//! Combines long-lived push feeds (websocket ticker/trade streams) with a
//! pull (REST) fallback into a single price estimate per tracked asset.
//! Push connections are shared across assets that reference the same
//! (venue, pair) so the number of outbound connections stays bounded.

pub mod aggregator;
pub mod error;
pub mod provider;
pub mod quote;
pub mod rest;
pub mod venue;

pub use aggregator::{CombinePolicy, ConversionMode, PriceAggregator};
pub use error::{FeedError, FeedResult};
pub use provider::{
    build_aggregator, build_provider, validate_spec, PriceProvider, ProviderSpec,
    RandomPriceProvider, SourceSpec,
};
pub use quote::{PriceQuote, QuoteSlot, SourceOutcome};
pub use rest::{PullSource, RestClient};
pub use venue::{FeedConfig, FeedRegistry, VenueKind};

/// Initialize the rustls crypto provider.
///
/// Must be called once before any websocket connection is opened.
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
