//! WebSocket client for the CLOB market channel.
//!
//! Maintains live L2 order books for a dynamic set of outcome tokens. The
//! server pushes a full `book` snapshot on subscription and incremental
//! `price_change` deltas afterwards; `last_trade_price` events are surfaced
//! but do not touch book state.
//!
//! The venue only accepts the asset list inside the subscription message, so
//! changing the watched set means reconnecting with the updated list.
//! [`MarketStream::subscribe`] and [`MarketStream::unsubscribe`] mutate the
//! shared token set and nudge the connection task to resubscribe.
//!
//! Connection discipline: answer server pings, send a client ping on an
//! interval, force a reconnect when nothing arrives for the idle timeout,
//! and retry forever with a fixed delay between attempts.

use crate::book::{L2Book, Side};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Events emitted by the market stream.
#[derive(Debug, Clone)]
pub enum BookEvent {
    /// Full order book snapshot received.
    Snapshot {
        /// Token/asset ID.
        asset_id: String,
        /// Complete order book state after the snapshot.
        book: L2Book,
    },
    /// Incremental delta applied to a single price level.
    Delta {
        /// Token/asset ID.
        asset_id: String,
        /// Side of the update.
        side: Side,
        /// Price level.
        price: Decimal,
        /// New size (0 means the level was removed).
        size: Decimal,
    },
    /// Trade execution reported by the venue.
    Trade {
        /// Token/asset ID.
        asset_id: String,
        /// Execution price.
        price: Decimal,
        /// Trade size.
        size: Decimal,
    },
    /// Connection established and subscription sent.
    Connected,
    /// Connection lost; the stream will reconnect on its own.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
}

/// Configuration for the market stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket URL for the market channel.
    pub url: String,
    /// Client ping interval.
    pub ping_interval: Duration,
    /// Reconnect when no inbound message arrives for this long.
    pub idle_timeout: Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Event channel buffer size.
    pub channel_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            channel_buffer_size: 1000,
        }
    }
}

impl StreamConfig {
    /// Builds a stream config from the application feed section.
    #[must_use]
    pub fn from_feed(feed: &polyarb_core::FeedConfig) -> Self {
        Self {
            url: feed.market_ws_url.clone(),
            ping_interval: Duration::from_secs(feed.ping_interval_secs),
            idle_timeout: Duration::from_secs(feed.idle_timeout_secs),
            reconnect_delay: Duration::from_secs(feed.reconnect_delay_secs),
            channel_buffer_size: feed.channel_buffer_size,
        }
    }
}

/// Errors from the market stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Failed to establish the WebSocket connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON decoding error.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No inbound traffic within the idle timeout.
    #[error("feed idle for {0:?}")]
    Idle(Duration),
}

enum Command {
    Resubscribe,
    Shutdown,
}

/// Handle to the market stream connection task.
///
/// Cheap to clone; all clones share the same book table and connection.
#[derive(Clone)]
pub struct MarketStream {
    books: Arc<RwLock<HashMap<String, L2Book>>>,
    tokens: Arc<RwLock<BTreeSet<String>>>,
    command_tx: mpsc::Sender<Command>,
}

impl MarketStream {
    /// Connects and subscribes to the given token ids.
    ///
    /// Returns the handle and a receiver for book events. The connection
    /// task runs until [`MarketStream::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// This constructor itself does not fail; connection errors surface as
    /// [`BookEvent::Disconnected`] and are retried internally.
    pub fn connect(
        token_ids: Vec<String>,
        config: StreamConfig,
    ) -> (Self, mpsc::Receiver<BookEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer_size);
        let (command_tx, command_rx) = mpsc::channel(16);

        let books: Arc<RwLock<HashMap<String, L2Book>>> = Arc::new(RwLock::new(HashMap::new()));
        let tokens: Arc<RwLock<BTreeSet<String>>> =
            Arc::new(RwLock::new(token_ids.iter().cloned().collect()));

        {
            let mut guard = books.write();
            for token_id in &token_ids {
                guard.insert(token_id.clone(), L2Book::new(token_id.clone()));
            }
        }

        tokio::spawn(run_connection_loop(
            config,
            Arc::clone(&books),
            Arc::clone(&tokens),
            event_tx,
            command_rx,
        ));

        (
            Self {
                books,
                tokens,
                command_tx,
            },
            event_rx,
        )
    }

    /// Returns a snapshot of the current order book for a token.
    #[must_use]
    pub fn book(&self, token_id: &str) -> Option<L2Book> {
        self.books.read().get(token_id).cloned()
    }

    /// Returns the currently subscribed token ids.
    #[must_use]
    pub fn subscribed_tokens(&self) -> Vec<String> {
        self.tokens.read().iter().cloned().collect()
    }

    /// Adds tokens to the subscription and resubscribes.
    pub async fn subscribe(&self, token_ids: &[String]) {
        {
            let mut tokens = self.tokens.write();
            let mut books = self.books.write();
            for token_id in token_ids {
                tokens.insert(token_id.clone());
                books
                    .entry(token_id.clone())
                    .or_insert_with(|| L2Book::new(token_id.clone()));
            }
        }
        let _ = self.command_tx.send(Command::Resubscribe).await;
    }

    /// Removes tokens from the subscription, drops their books, and
    /// resubscribes.
    pub async fn unsubscribe(&self, token_ids: &[String]) {
        {
            let mut tokens = self.tokens.write();
            let mut books = self.books.write();
            for token_id in token_ids {
                tokens.remove(token_id);
                books.remove(token_id);
            }
        }
        let _ = self.command_tx.send(Command::Resubscribe).await;
    }

    /// Gracefully shuts down the connection task.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}

// ============================================================================
// Wire messages
// ============================================================================

#[derive(Debug, Serialize)]
struct SubscriptionMessage<'a> {
    assets_ids: &'a [String],
    #[serde(rename = "type")]
    msg_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct WsMessage {
    event_type: String,
    #[serde(flatten)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BookMessage {
    asset_id: String,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct PriceChangeMessage {
    #[serde(default)]
    price_changes: Vec<PriceChange>,
    // Single-change form used by older gateway versions.
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: String,
    price: String,
    size: String,
    side: String,
}

#[derive(Debug, Deserialize)]
struct LastTradePriceMessage {
    asset_id: String,
    price: String,
    #[serde(default)]
    size: Option<String>,
}

// ============================================================================
// Connection loop
// ============================================================================

async fn run_connection_loop(
    config: StreamConfig,
    books: Arc<RwLock<HashMap<String, L2Book>>>,
    tokens: Arc<RwLock<BTreeSet<String>>>,
    event_tx: mpsc::Sender<BookEvent>,
    mut command_rx: mpsc::Receiver<Command>,
) {
    loop {
        let subscribed: Vec<String> = tokens.read().iter().cloned().collect();
        if subscribed.is_empty() {
            // Nothing to watch; wait for a subscribe or shutdown.
            match command_rx.recv().await {
                Some(Command::Resubscribe) => continue,
                Some(Command::Shutdown) | None => return,
            }
        }

        info!(url = %config.url, tokens = subscribed.len(), "Connecting to market stream");

        match connect_and_run(&config, &subscribed, &books, &event_tx, &mut command_rx).await {
            Ok(LoopExit::Shutdown) => {
                info!("Market stream shut down");
                return;
            }
            Ok(LoopExit::Resubscribe) => {
                debug!("Resubscribing with updated token set");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Market stream connection lost");
                let _ = event_tx
                    .send(BookEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                sleep(config.reconnect_delay).await;
            }
        }
    }
}

enum LoopExit {
    Shutdown,
    Resubscribe,
}

async fn connect_and_run(
    config: &StreamConfig,
    token_ids: &[String],
    books: &Arc<RwLock<HashMap<String, L2Book>>>,
    event_tx: &mpsc::Sender<BookEvent>,
    command_rx: &mut mpsc::Receiver<Command>,
) -> Result<LoopExit, StreamError> {
    let (ws_stream, _response) = connect_async(&config.url)
        .await
        .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    let sub_msg = SubscriptionMessage {
        assets_ids: token_ids,
        msg_type: "market",
    };
    write.send(Message::Text(serde_json::to_string(&sub_msg)?)).await?;
    let _ = event_tx.send(BookEvent::Connected).await;

    let mut ping_interval = tokio::time::interval(config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_inbound = Instant::now();
    let mut idle_check = tokio::time::interval(Duration::from_secs(1));
    idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                match command {
                    Some(Command::Resubscribe) => {
                        // Coalesce bursts of subscription changes.
                        while let Ok(next) = command_rx.try_recv() {
                            if matches!(next, Command::Shutdown) {
                                let _ = write.close().await;
                                return Ok(LoopExit::Shutdown);
                            }
                        }
                        let _ = write.close().await;
                        return Ok(LoopExit::Resubscribe);
                    }
                    Some(Command::Shutdown) | None => {
                        let _ = write.close().await;
                        return Ok(LoopExit::Shutdown);
                    }
                }
            }

            _ = ping_interval.tick() => {
                write.send(Message::Ping(vec![])).await?;
            }

            _ = idle_check.tick() => {
                if last_inbound.elapsed() > config.idle_timeout {
                    return Err(StreamError::Idle(config.idle_timeout));
                }
            }

            msg = read.next() => {
                last_inbound = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = process_message(&text, books, event_tx).await {
                            // A malformed message is skipped, never fatal.
                            warn!(error = %e, "Failed to process market message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        return Err(StreamError::ConnectionFailed(
                            frame.map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "connection closed".to_string()),
                        ));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = String::from_utf8(data) {
                            if let Err(e) = process_message(&text, books, event_tx).await {
                                warn!(error = %e, "Failed to process binary market message");
                            }
                        }
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => return Err(StreamError::WebSocket(e)),
                    None => {
                        return Err(StreamError::ConnectionFailed("stream ended".to_string()));
                    }
                }
            }
        }
    }
}

/// Processes one text frame, which may carry a single message or an array.
async fn process_message(
    text: &str,
    books: &Arc<RwLock<HashMap<String, L2Book>>>,
    event_tx: &mpsc::Sender<BookEvent>,
) -> Result<(), StreamError> {
    let messages: Vec<WsMessage> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text)?
    } else {
        vec![serde_json::from_str(text)?]
    };

    for msg in messages {
        match msg.event_type.as_str() {
            "book" => {
                let book_msg: BookMessage = serde_json::from_value(msg.data)?;
                handle_book_snapshot(&book_msg, books, event_tx).await;
            }
            "price_change" => {
                let change_msg: PriceChangeMessage = serde_json::from_value(msg.data)?;
                handle_price_change(&change_msg, books, event_tx).await;
            }
            "last_trade_price" => {
                let trade_msg: LastTradePriceMessage = serde_json::from_value(msg.data)?;
                let _ = event_tx
                    .send(BookEvent::Trade {
                        asset_id: trade_msg.asset_id,
                        price: parse_decimal(&trade_msg.price),
                        size: trade_msg
                            .size
                            .as_deref()
                            .map(parse_decimal)
                            .unwrap_or(Decimal::ZERO),
                    })
                    .await;
            }
            other => {
                debug!(event_type = %other, "Ignoring market event");
            }
        }
    }

    Ok(())
}

async fn handle_book_snapshot(
    msg: &BookMessage,
    books: &Arc<RwLock<HashMap<String, L2Book>>>,
    event_tx: &mpsc::Sender<BookEvent>,
) {
    let bids = parse_price_levels(&msg.bids);
    let asks = parse_price_levels(&msg.asks);
    let timestamp_ms = msg.timestamp.as_ref().and_then(|t| t.parse::<i64>().ok());

    let snapshot = {
        let mut guard = books.write();
        let book = guard
            .entry(msg.asset_id.clone())
            .or_insert_with(|| L2Book::new(msg.asset_id.clone()));
        book.apply_snapshot(bids, asks);
        book.last_update_ms = timestamp_ms;
        book.clone()
    };

    debug!(
        asset_id = %msg.asset_id,
        bid_levels = snapshot.bid_levels(),
        ask_levels = snapshot.ask_levels(),
        "Applied book snapshot"
    );

    let _ = event_tx
        .send(BookEvent::Snapshot {
            asset_id: msg.asset_id.clone(),
            book: snapshot,
        })
        .await;
}

async fn handle_price_change(
    msg: &PriceChangeMessage,
    books: &Arc<RwLock<HashMap<String, L2Book>>>,
    event_tx: &mpsc::Sender<BookEvent>,
) {
    for change in &msg.price_changes {
        apply_single_delta(
            &change.asset_id,
            &change.price,
            &change.size,
            &change.side,
            books,
            event_tx,
        )
        .await;
    }

    if let (Some(asset_id), Some(price), Some(size), Some(side)) = (
        msg.asset_id.as_ref(),
        msg.price.as_ref(),
        msg.size.as_ref(),
        msg.side.as_ref(),
    ) {
        apply_single_delta(asset_id, price, size, side, books, event_tx).await;
    }
}

async fn apply_single_delta(
    asset_id: &str,
    price_str: &str,
    size_str: &str,
    side_str: &str,
    books: &Arc<RwLock<HashMap<String, L2Book>>>,
    event_tx: &mpsc::Sender<BookEvent>,
) {
    let price = parse_decimal(price_str);
    let size = parse_decimal(size_str);
    let side = parse_side(side_str);

    {
        let mut guard = books.write();
        // A delta for an unknown token creates the book speculatively; the
        // snapshot that follows will replace whatever lands here.
        let book = guard
            .entry(asset_id.to_string())
            .or_insert_with(|| L2Book::new(asset_id.to_string()));
        book.apply_level(side, price, size);
    }

    let _ = event_tx
        .send(BookEvent::Delta {
            asset_id: asset_id.to_string(),
            side,
            price,
            size,
        })
        .await;
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_price_levels(levels: &[PriceLevel]) -> Vec<(Decimal, Decimal)> {
    levels
        .iter()
        .filter_map(|level| {
            let price = parse_decimal(&level.price);
            let size = parse_decimal(&level.size);
            (size > Decimal::ZERO).then_some((price, size))
        })
        .collect()
}

/// Parses a decimal string, tolerating the venue's bare ".XX" form.
fn parse_decimal(s: &str) -> Decimal {
    let normalized = if s.starts_with('.') {
        format!("0{s}")
    } else {
        s.to_string()
    };
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

fn parse_side(s: &str) -> Side {
    match s.to_uppercase().as_str() {
        "SELL" | "S" => Side::Sell,
        _ => Side::Buy,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal_formats() {
        assert_eq!(parse_decimal("0.48"), dec!(0.48));
        assert_eq!(parse_decimal(".48"), dec!(0.48));
        assert_eq!(parse_decimal("100"), dec!(100));
        assert_eq!(parse_decimal("garbage"), Decimal::ZERO);
    }

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side("BUY"), Side::Buy);
        assert_eq!(parse_side("sell"), Side::Sell);
        assert_eq!(parse_side("S"), Side::Sell);
        assert_eq!(parse_side("?"), Side::Buy);
    }

    #[test]
    fn test_parse_price_levels_filters_zero_size() {
        let levels = vec![
            PriceLevel {
                price: ".48".to_string(),
                size: "100".to_string(),
            },
            PriceLevel {
                price: ".46".to_string(),
                size: "0".to_string(),
            },
        ];
        let parsed = parse_price_levels(&levels);
        assert_eq!(parsed, vec![(dec!(0.48), dec!(100))]);
    }

    #[test]
    fn test_subscription_message_shape() {
        let token_ids = vec!["token-1".to_string(), "token-2".to_string()];
        let sub = SubscriptionMessage {
            assets_ids: &token_ids,
            msg_type: "market",
        };
        let json = serde_json::to_string(&sub).unwrap();
        assert!(json.contains(r#""assets_ids":["token-1","token-2"]"#));
        assert!(json.contains(r#""type":"market""#));
    }

    #[tokio::test]
    async fn test_process_book_snapshot() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(16);

        let msg = r#"{
            "event_type": "book",
            "asset_id": "tok-1",
            "bids": [{"price": ".48", "size": "100"}],
            "asks": [{"price": ".52", "size": "150"}],
            "timestamp": "1706745600000"
        }"#;
        process_message(msg, &books, &tx).await.unwrap();

        let book = books.read().get("tok-1").cloned().unwrap();
        assert_eq!(book.best_bid(), Some((dec!(0.48), dec!(100))));
        assert_eq!(book.best_ask(), Some((dec!(0.52), dec!(150))));
        assert_eq!(book.last_update_ms, Some(1706745600000));

        assert!(matches!(rx.recv().await, Some(BookEvent::Snapshot { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_replaces_prior_levels() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, _rx) = mpsc::channel(16);

        let first = r#"{
            "event_type": "book",
            "asset_id": "tok-1",
            "bids": [{"price": ".40", "size": "10"}, {"price": ".39", "size": "10"}],
            "asks": [{"price": ".60", "size": "10"}]
        }"#;
        let second = r#"{
            "event_type": "book",
            "asset_id": "tok-1",
            "bids": [{"price": ".45", "size": "5"}],
            "asks": [{"price": ".55", "size": "5"}]
        }"#;
        process_message(first, &books, &tx).await.unwrap();
        process_message(second, &books, &tx).await.unwrap();

        let book = books.read().get("tok-1").cloned().unwrap();
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.best_bid(), Some((dec!(0.45), dec!(5))));
    }

    #[tokio::test]
    async fn test_process_price_change_array() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(16);

        let snapshot = r#"{
            "event_type": "book",
            "asset_id": "tok-1",
            "bids": [],
            "asks": [{"price": ".52", "size": "150"}]
        }"#;
        process_message(snapshot, &books, &tx).await.unwrap();
        let _ = rx.recv().await;

        let delta = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "tok-1", "price": ".52", "size": "0", "side": "SELL"},
                {"asset_id": "tok-1", "price": ".53", "size": "40", "side": "SELL"}
            ]
        }"#;
        process_message(delta, &books, &tx).await.unwrap();

        let book = books.read().get("tok-1").cloned().unwrap();
        // Removing .52 leaves .53 as the best ask.
        assert_eq!(book.best_ask(), Some((dec!(0.53), dec!(40))));
    }

    #[tokio::test]
    async fn test_process_price_change_single_form() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, _rx) = mpsc::channel(16);

        let delta = r#"{
            "event_type": "price_change",
            "asset_id": "tok-9",
            "price": ".50",
            "size": "75",
            "side": "BUY"
        }"#;
        process_message(delta, &books, &tx).await.unwrap();

        // Speculative book created for an unseen token.
        let book = books.read().get("tok-9").cloned().unwrap();
        assert_eq!(book.best_bid(), Some((dec!(0.50), dec!(75))));
    }

    #[tokio::test]
    async fn test_process_message_array_frame() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, _rx) = mpsc::channel(16);

        let frame = r#"[
            {"event_type": "book", "asset_id": "a", "bids": [], "asks": [{"price": ".5", "size": "1"}]},
            {"event_type": "book", "asset_id": "b", "bids": [], "asks": [{"price": ".6", "size": "2"}]}
        ]"#;
        process_message(frame, &books, &tx).await.unwrap();
        assert_eq!(books.read().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_event_type_ignored() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, _rx) = mpsc::channel(16);
        let msg = r#"{"event_type": "tick_size_change", "asset_id": "x"}"#;
        process_message(msg, &books, &tx).await.unwrap();
        assert!(books.read().is_empty());
    }

    #[tokio::test]
    async fn test_last_trade_price_does_not_touch_books() {
        let books = Arc::new(RwLock::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(16);
        let msg = r#"{"event_type": "last_trade_price", "asset_id": "tok-1", "price": ".48", "size": "25"}"#;
        process_message(msg, &books, &tx).await.unwrap();
        assert!(books.read().is_empty());
        match rx.recv().await {
            Some(BookEvent::Trade { asset_id, price, size }) => {
                assert_eq!(asset_id, "tok-1");
                assert_eq!(price, dec!(0.48));
                assert_eq!(size, dec!(25));
            }
            other => panic!("expected Trade event, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod mock_server_tests {
    //! End-to-end tests against an in-process WebSocket server.

    use super::*;
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;

    /// Accepts one connection, waits for the subscription, then sends the
    /// given frames.
    async fn spawn_mock_server(frames: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut write, mut read) = ws.split();
                // Subscription message arrives first.
                let _ = read.next().await;
                for frame in frames {
                    let _ = write.send(Message::Text(frame)).await;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_stream_applies_snapshot_then_delta() {
        let url = spawn_mock_server(vec![
            r#"{"event_type":"book","asset_id":"tok-1","bids":[{"price":".48","size":"50"}],"asks":[{"price":".52","size":"60"}]}"#.to_string(),
            r#"{"event_type":"price_change","asset_id":"tok-1","price":".52","size":"0","side":"SELL"}"#.to_string(),
        ])
        .await;

        let config = StreamConfig {
            url,
            ..Default::default()
        };
        let (stream, mut rx) = MarketStream::connect(vec!["tok-1".to_string()], config);

        let mut saw_delta = false;
        let deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                if matches!(event, BookEvent::Delta { .. }) {
                    saw_delta = true;
                    break;
                }
            }
        });
        let _ = deadline.await;
        assert!(saw_delta);

        let book = stream.book("tok-1").unwrap();
        assert_eq!(book.best_bid(), Some((dec!(0.48), dec!(50))));
        assert!(book.best_ask().is_none());

        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_book() {
        let url = spawn_mock_server(vec![
            r#"{"event_type":"book","asset_id":"tok-1","bids":[],"asks":[{"price":".5","size":"1"}]}"#.to_string(),
        ])
        .await;

        let config = StreamConfig {
            url,
            ..Default::default()
        };
        let (stream, mut rx) = MarketStream::connect(
            vec!["tok-1".to_string(), "tok-2".to_string()],
            config,
        );

        // Wait for connection before mutating subscriptions.
        let _ = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;

        stream.unsubscribe(&["tok-2".to_string()]).await;
        assert!(stream.book("tok-2").is_none());
        assert_eq!(stream.subscribed_tokens(), vec!["tok-1".to_string()]);

        stream.shutdown().await;
    }
}
