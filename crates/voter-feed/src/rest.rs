//! Pull (REST) ticker fallback.
//!
//! Used only when no push feed has a fresh quote. One request per venue,
//! in configured order for the `first` policy, all venues for `average`.

use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use voter_core::Price;

use crate::error::{FeedError, FeedResult};
use crate::venue::VenueKind;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Seam over the synchronous pull request, so aggregation is testable
/// without network access.
pub trait PullSource: Send + Sync {
    fn fetch(&self, venue: VenueKind, pair: &str) -> BoxFuture<'_, FeedResult<Price>>;
}

/// Default timeout for ticker requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// REST ticker client.
pub struct RestClient {
    client: Client,
}

impl RestClient {
    /// Create a REST client with the default request timeout.
    ///
    /// # Errors
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new() -> FeedResult<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    fn ticker_url(venue: VenueKind, pair: &str) -> String {
        match venue {
            VenueKind::Binance => format!(
                "https://api.binance.com/api/v3/ticker/price?symbol={}",
                pair.to_uppercase()
            ),
            VenueKind::Kraken => {
                format!("https://api.kraken.com/0/public/Ticker?pair={pair}")
            }
            VenueKind::Coinbase => {
                format!("https://api.exchange.coinbase.com/products/{pair}/ticker")
            }
        }
    }

    async fn fetch_inner(&self, venue: VenueKind, pair: &str) -> FeedResult<Price> {
        let url = Self::ticker_url(venue, pair);
        let body: Value = self.client.get(&url).send().await?.json().await?;
        let price = parse_ticker_response(venue, &body)
            .ok_or_else(|| FeedError::Parse(format!("no price in {venue} ticker response")))?;
        Ok(Price::new(price))
    }
}

impl PullSource for RestClient {
    fn fetch(&self, venue: VenueKind, pair: &str) -> BoxFuture<'_, FeedResult<Price>> {
        let pair = pair.to_string();
        Box::pin(async move { self.fetch_inner(venue, &pair).await })
    }
}

/// Extract the last price from a venue's ticker response body.
fn parse_ticker_response(venue: VenueKind, body: &Value) -> Option<Decimal> {
    match venue {
        // {"symbol":"BTCUSDT","price":"45031.12"}
        VenueKind::Binance => body.get("price")?.as_str()?.parse().ok(),
        // {"error":[],"result":{"XXBTZUSD":{"c":["45031.12","0.001"],...}}}
        VenueKind::Kraken => {
            let result = body.get("result")?.as_object()?;
            let entry = result.values().next()?;
            entry.get("c")?.as_array()?.first()?.as_str()?.parse().ok()
        }
        // {"trade_id":1,"price":"45031.12","bid":"...","ask":"..."}
        VenueKind::Coinbase => body.get("price")?.as_str()?.parse().ok(),
    }
}
