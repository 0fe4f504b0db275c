//! Push-feed venue connections.
//!
//! One websocket connection per (venue, pair), shared by every asset that
//! references it. Each connection task is the sole writer of its quote
//! slot and reconnects with bounded exponential backoff.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voter_core::Price;

use crate::error::FeedError;
use crate::quote::{PriceQuote, QuoteSlot};

/// Supported push/pull market data venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Binance,
    Kraken,
    Coinbase,
}

impl VenueKind {
    /// Websocket endpoint for a ticker stream on `pair`.
    #[must_use]
    pub fn ws_url(&self, pair: &str) -> String {
        match self {
            // Binance encodes the stream in the URL, no subscribe frame.
            Self::Binance => format!(
                "wss://stream.binance.com:9443/ws/{}@trade",
                pair.to_lowercase()
            ),
            Self::Kraken => "wss://ws.kraken.com".to_string(),
            Self::Coinbase => "wss://ws-feed.exchange.coinbase.com".to_string(),
        }
    }

    /// Subscription frame to send after connecting, if the venue needs one.
    #[must_use]
    pub fn subscribe_frame(&self, pair: &str) -> Option<String> {
        match self {
            Self::Binance => None,
            Self::Kraken => Some(
                json!({
                    "event": "subscribe",
                    "pair": [pair],
                    "subscription": {"name": "ticker"}
                })
                .to_string(),
            ),
            Self::Coinbase => Some(
                json!({
                    "type": "subscribe",
                    "product_ids": [pair],
                    "channels": ["ticker"]
                })
                .to_string(),
            ),
        }
    }

    /// Extract the trade/ticker price from one raw websocket text frame.
    ///
    /// Returns `None` for frames that are not price updates (heartbeats,
    /// subscription acks, system status).
    #[must_use]
    pub fn parse_tick(&self, text: &str) -> Option<Decimal> {
        let value: Value = serde_json::from_str(text).ok()?;
        match self {
            // {"e":"trade","p":"101.23",...}
            Self::Binance => value.get("p")?.as_str()?.parse().ok(),
            // [chanId, {"c":["101.23","0.1"],...}, "ticker", "XBT/USD"]
            Self::Kraken => {
                let arr = value.as_array()?;
                let data = arr.get(1)?.as_object()?;
                data.get("c")?.as_array()?.first()?.as_str()?.parse().ok()
            }
            // {"type":"ticker","price":"101.23",...}
            Self::Coinbase => {
                if value.get("type")?.as_str()? != "ticker" {
                    return None;
                }
                value.get("price")?.as_str()?.parse().ok()
            }
        }
    }
}

impl FromStr for VenueKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "kraken" => Ok(Self::Kraken),
            "coinbase" => Ok(Self::Coinbase),
            other => Err(FeedError::UnknownVenue(other.to_string())),
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Kraken => write!(f, "kraken"),
            Self::Coinbase => write!(f, "coinbase"),
        }
    }
}

/// Feed connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

/// Registry of live feed connections, deduplicated per (venue, pair).
pub struct FeedRegistry {
    slots: DashMap<(VenueKind, String), Arc<QuoteSlot>>,
    config: FeedConfig,
    shutdown: CancellationToken,
}

impl FeedRegistry {
    #[must_use]
    pub fn new(config: FeedConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe to a (venue, pair) stream, reusing an existing connection
    /// when one is already live. Returns the shared quote slot.
    pub fn subscribe(&self, venue: VenueKind, pair: &str) -> Arc<QuoteSlot> {
        if let Some(slot) = self.slots.get(&(venue, pair.to_string())) {
            return Arc::clone(&slot);
        }

        let slot = Arc::new(QuoteSlot::new());
        self.slots
            .insert((venue, pair.to_string()), Arc::clone(&slot));

        let task_slot = Arc::clone(&slot);
        let config = self.config.clone();
        let shutdown = self.shutdown.child_token();
        let pair = pair.to_string();
        tokio::spawn(async move {
            run_feed(venue, pair, task_slot, config, shutdown).await;
        });

        slot
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.slots.len()
    }

    /// Signal all feed tasks to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Connection loop for one (venue, pair) feed.
///
/// Reconnects with exponential backoff until cancelled or the attempt
/// budget (when non-zero) is exhausted.
async fn run_feed(
    venue: VenueKind,
    pair: String,
    slot: Arc<QuoteSlot>,
    config: FeedConfig,
    shutdown: CancellationToken,
) {
    let source_id = format!("{venue}:{pair}");
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            info!(source = %source_id, "feed shutting down");
            return;
        }

        match connect_and_stream(venue, &pair, &slot, &source_id, &shutdown).await {
            Ok(()) => {
                // Clean shutdown from inside the stream loop.
                return;
            }
            Err(e) => {
                attempt += 1;
                if config.max_reconnect_attempts > 0 && attempt >= config.max_reconnect_attempts {
                    warn!(source = %source_id, attempts = attempt, "feed giving up after max reconnect attempts");
                    return;
                }
                let delay = backoff_delay(
                    config.reconnect_base_delay_ms,
                    config.reconnect_max_delay_ms,
                    attempt,
                );
                warn!(
                    source = %source_id,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "feed disconnected, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
}

/// Exponential backoff delay for `attempt` (1-based), capped at `max_ms`.
fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exp).min(max_ms);
    Duration::from_millis(delay)
}

async fn connect_and_stream(
    venue: VenueKind,
    pair: &str,
    slot: &QuoteSlot,
    source_id: &str,
    shutdown: &CancellationToken,
) -> Result<(), FeedError> {
    let url = venue.ws_url(pair);
    let (ws, _) = connect_async(&url)
        .await
        .map_err(|e| FeedError::Parse(format!("connect {url}: {e}")))?;
    let (mut write, mut read) = ws.split();

    if let Some(frame) = venue.subscribe_frame(pair) {
        write
            .send(Message::Text(frame))
            .await
            .map_err(|e| FeedError::Parse(format!("subscribe: {e}")))?;
    }
    info!(source = %source_id, "feed connected");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(price) = venue.parse_tick(&text) {
                            slot.store(PriceQuote {
                                source_id: source_id.to_string(),
                                price: Price::new(price),
                                observed_at_ms: chrono::Utc::now().timestamp_millis(),
                            });
                            debug!(source = %source_id, %price, "tick");
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| FeedError::Parse(format!("pong: {e}")))?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(FeedError::Parse(format!("stream: {e}"))),
                    None => return Err(FeedError::Parse("stream closed".to_string())),
                }
            }
        }
    }
}
