//! Leader price feed from the Binance spot WebSocket.
//!
//! One [`SpotFeed`] per leader instrument streams `aggTrade` events into a
//! shared [`LeaderTracker`] and emits a [`MoveEvent`] whenever the trailing
//! window shows a move beyond the configured threshold. [`SpotFeedSet`]
//! spawns one feed task per configured leader.

use crate::tracker::{LeaderTracker, MoveEvent};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::RwLock;
use polyarb_core::{FeedConfig, LagConfig, Leader};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Errors from the spot feed.
#[derive(Error, Debug)]
pub enum SpotFeedError {
    /// WebSocket connection failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed by the server.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Configuration for one leader feed connection.
#[derive(Debug, Clone)]
pub struct SpotFeedConfig {
    /// WebSocket base URL, stream path appended.
    pub base_url: String,
    /// Stream symbol, e.g. `btcusdt`.
    pub symbol: String,
    /// Leader name for events and logs.
    pub leader_name: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Trailing detection window in milliseconds.
    pub detection_window_ms: i64,
    /// Move threshold as an absolute percentage.
    pub move_threshold_pct: f64,
}

impl SpotFeedConfig {
    /// Builds a per-leader config from the application sections.
    #[must_use]
    pub fn for_leader(feed: &FeedConfig, lag: &LagConfig, leader: &Leader) -> Self {
        Self {
            base_url: feed.spot_ws_url.clone(),
            symbol: leader.symbol.clone(),
            leader_name: leader.name.clone(),
            reconnect_delay: Duration::from_secs(feed.reconnect_delay_secs),
            detection_window_ms: lag.detection_window_secs * 1000,
            move_threshold_pct: lag.move_threshold_pct,
        }
    }
}

/// Binance aggTrade WebSocket message.
#[derive(Debug, Deserialize)]
struct AggTradeEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Counters for one feed connection.
#[derive(Debug, Clone, Default)]
pub struct SpotFeedStats {
    /// Total messages received.
    pub messages_received: u64,
    /// Parse errors encountered.
    pub parse_errors: u64,
    /// Reconnect count.
    pub reconnects: u32,
    /// Last update timestamp.
    pub last_update: Option<DateTime<Utc>>,
}

/// Streaming leader price feed for a single symbol.
pub struct SpotFeed {
    config: SpotFeedConfig,
    tracker: Arc<RwLock<LeaderTracker>>,
    move_tx: mpsc::Sender<MoveEvent>,
    stats: SpotFeedStats,
    should_stop: Arc<AtomicBool>,
}

impl SpotFeed {
    /// Creates a feed writing into the given tracker and move channel.
    pub fn new(
        config: SpotFeedConfig,
        tracker: Arc<RwLock<LeaderTracker>>,
        move_tx: mpsc::Sender<MoveEvent>,
    ) -> Self {
        Self {
            config,
            tracker,
            move_tx,
            stats: SpotFeedStats::default(),
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle to signal the feed to stop.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    /// Returns the current statistics.
    #[must_use]
    pub fn stats(&self) -> &SpotFeedStats {
        &self.stats
    }

    fn build_url(&self) -> String {
        format!("{}/{}@aggTrade", self.config.base_url, self.config.symbol)
    }

    /// Runs the feed until stopped, reconnecting on a fixed delay forever.
    pub async fn run(&mut self) {
        loop {
            if self.should_stop.load(Ordering::SeqCst) {
                info!(symbol = %self.config.symbol, "Spot feed stopping on request");
                return;
            }

            match self.connect_and_stream().await {
                Ok(()) => {
                    info!(symbol = %self.config.symbol, "Spot feed exiting cleanly");
                    return;
                }
                Err(e) => {
                    self.stats.reconnects += 1;
                    warn!(
                        symbol = %self.config.symbol,
                        error = %e,
                        delay = ?self.config.reconnect_delay,
                        "Spot feed disconnected, reconnecting"
                    );
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    async fn connect_and_stream(&mut self) -> Result<(), SpotFeedError> {
        let url = self.build_url();
        info!(url = %url, "Connecting to spot feed");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            if self.should_stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            match msg {
                Ok(Message::Text(text)) => self.handle_message(&text).await,
                Ok(Message::Ping(_)) => {
                    // Tungstenite answers pings on flush; nothing to do.
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(SpotFeedError::Closed(reason));
                }
                Err(e) => return Err(SpotFeedError::WebSocket(e)),
                _ => {}
            }
        }

        Err(SpotFeedError::Closed("stream ended".to_string()))
    }

    async fn handle_message(&mut self, text: &str) {
        self.stats.messages_received += 1;

        let event: AggTradeEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                self.stats.parse_errors += 1;
                if self.stats.parse_errors <= 5 {
                    warn!(symbol = %self.config.symbol, error = %e, "Unparseable spot message");
                }
                return;
            }
        };

        if event.event_type != "aggTrade" {
            return;
        }

        let Ok(price) = event.price.parse::<f64>() else {
            self.stats.parse_errors += 1;
            return;
        };

        let detected = {
            let mut tracker = self.tracker.write();
            tracker.update(price, event.trade_time);
            tracker.detect_move(
                &self.config.symbol,
                &self.config.leader_name,
                self.config.detection_window_ms,
                self.config.move_threshold_pct,
            )
        };
        self.stats.last_update = DateTime::from_timestamp_millis(event.trade_time);

        if let Some(event) = detected {
            debug!(
                symbol = %event.symbol,
                move_pct = event.move_pct,
                "Leader move detected"
            );
            let _ = self.move_tx.send(event).await;
        }
    }
}

/// Spawned feeds for every configured leader, sharing one move channel.
pub struct SpotFeedSet {
    trackers: HashMap<String, Arc<RwLock<LeaderTracker>>>,
    stop_handles: Vec<Arc<AtomicBool>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl SpotFeedSet {
    /// Spawns one feed task per leader.
    ///
    /// Returns the set and the receiver for move events across all leaders.
    #[must_use]
    pub fn spawn(feed: &FeedConfig, lag: &LagConfig) -> (Self, mpsc::Receiver<MoveEvent>) {
        let (move_tx, move_rx) = mpsc::channel(feed.channel_buffer_size);
        let mut trackers = HashMap::new();
        let mut stop_handles = Vec::new();
        let mut handles = Vec::new();

        for leader in &lag.leaders {
            let tracker = Arc::new(RwLock::new(LeaderTracker::new()));
            trackers.insert(leader.symbol.clone(), Arc::clone(&tracker));

            let config = SpotFeedConfig::for_leader(feed, lag, leader);
            let mut spot_feed = SpotFeed::new(config, tracker, move_tx.clone());
            stop_handles.push(spot_feed.stop_handle());

            handles.push(tokio::spawn(async move {
                spot_feed.run().await;
            }));

            info!(symbol = %leader.symbol, name = %leader.name, "Spawned leader feed");
        }

        (
            Self {
                trackers,
                stop_handles,
                handles,
            },
            move_rx,
        )
    }

    /// Returns the tracker for a leader symbol.
    #[must_use]
    pub fn tracker(&self, symbol: &str) -> Option<Arc<RwLock<LeaderTracker>>> {
        self.trackers.get(symbol).cloned()
    }

    /// Signals every feed to stop and aborts their tasks.
    pub fn shutdown(&self) {
        for stop in &self.stop_handles {
            stop.store(true, Ordering::SeqCst);
        }
        for handle in &self.handles {
            handle.abort();
        }
    }
}
