//! Engine wiring: feeds, strategies, execution, and rotation.
//!
//! Task topology: one connection task per venue feed, a periodic strategy
//! scan tick, a single consumer for the rotation queue, a slower discovery
//! refresh, and a bounded spawn per trade execution. Order-book state flows
//! from the market stream; the engine's event loop owns every piece of
//! strategy state, so nothing here needs a lock beyond the book table
//! itself.

use crate::executor::{classify_cost, ExecutionEngine, LiveGateway, OrderGateway, SimGateway, StatusBand};
use crate::health::HealthMonitor;
use crate::intra::IntraScanner;
use crate::lag::LagStrategy;
use crate::ledger::Ledger;
use crate::parser::ParserChain;
use crate::watch::{removal_queue, RemovalReason, RemovalRequest, WatchSetManager};
use anyhow::{bail, Context, Result};
use polyarb_binance::{MoveEvent, SpotFeedSet};
use polyarb_core::AppConfig;
use polyarb_polymarket::{discovery, BookEvent, MarketStream, StreamConfig, VenueClient};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Feed names used for health tracking.
const FEED_MARKET: &str = "polymarket";
const FEED_SPOT: &str = "binance";

/// The assembled trading system.
pub struct Engine {
    config: AppConfig,
    client: Arc<VenueClient>,
    stream: MarketStream,
    event_rx: mpsc::Receiver<BookEvent>,
    manager: WatchSetManager,
    scanner: IntraScanner,
    lag: LagStrategy,
    lag_exit_rx: mpsc::Receiver<String>,
    executor: Arc<ExecutionEngine>,
    health: HealthMonitor,
    spot: SpotFeedSet,
    move_rx: mpsc::Receiver<MoveEvent>,
    removal_tx: mpsc::Sender<RemovalRequest>,
    removal_rx: mpsc::Receiver<RemovalRequest>,
}

impl Engine {
    /// Builds the system: runs the initial discovery scan, connects the
    /// feeds, and installs the watch set.
    ///
    /// # Errors
    ///
    /// Fails when the initial scan finds no tradeable market at all — with
    /// nothing to watch there is nothing to run.
    pub async fn start(config: AppConfig) -> Result<Self> {
        let rpm = NonZeroU32::new(config.discovery.requests_per_minute)
            .context("requests_per_minute must be nonzero")?;
        let client = Arc::new(VenueClient::with_rate_limit(
            config.feeds.catalog_url.clone(),
            config.feeds.clob_url.clone(),
            rpm,
        ));

        info!("Running initial discovery scan");
        let ranked = discovery::scan(&client, &config.discovery).await;
        if ranked.is_empty() {
            bail!("discovery found no tradeable markets");
        }

        let (stream, event_rx) =
            MarketStream::connect(vec![], StreamConfig::from_feed(&config.feeds));

        let mut manager =
            WatchSetManager::new(stream.clone(), Arc::clone(&client), config.watch.max_watched);
        manager.install(ranked).await;

        let ledger = Arc::new(Ledger::open(
            &config.execution.orders_csv,
            &config.execution.trades_csv,
        )?);
        let gateway: Arc<dyn OrderGateway> = if config.execution.simulation {
            warn!("Execution engine in SIMULATION mode");
            Arc::new(SimGateway)
        } else {
            Arc::new(LiveGateway::new(Arc::clone(&client)))
        };
        let executor = Arc::new(ExecutionEngine::new(
            gateway,
            ledger,
            config.execution.max_concurrent,
            config.watch.unfavorable_limit,
        ));

        let scanner = IntraScanner::new(config.intra.clone(), &config.execution);
        let (lag, lag_exit_rx) = LagStrategy::new(config.lag.clone(), ParserChain::regex_only());

        let (spot, move_rx) = SpotFeedSet::spawn(&config.feeds, &config.lag);
        let health = HealthMonitor::new(Duration::from_secs(config.health.stale_after_secs));
        let (removal_tx, removal_rx) = removal_queue(64);

        Ok(Self {
            config,
            client,
            stream,
            event_rx,
            manager,
            scanner,
            lag,
            lag_exit_rx,
            executor,
            health,
            spot,
            move_rx,
            removal_tx,
            removal_rx,
        })
    }

    /// Runs the event loop until interrupted.
    pub async fn run(mut self) -> Result<()> {
        let mut scan_tick =
            tokio::time::interval(Duration::from_millis(self.config.intra.scan_interval_ms));
        scan_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut discovery_tick = tokio::time::interval(Duration::from_secs(
            self.config.discovery.refresh_interval_secs,
        ));
        discovery_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The constructor already ran the first scan.
        discovery_tick.tick().await;

        let reporter = self
            .health
            .spawn_reporter(Duration::from_secs(self.config.health.report_interval_secs));

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            watched = self.manager.watched().len(),
            leaders = self.config.lag.leaders.len(),
            "Engine running"
        );

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupt received, shutting down");
                    break;
                }

                _ = scan_tick.tick() => {
                    self.mark_spot_health();
                    self.scan_watched().await;
                }

                Some(event) = self.event_rx.recv() => {
                    self.on_book_event(event).await;
                }

                Some(move_event) = self.move_rx.recv() => {
                    self.health.mark(FEED_SPOT);
                    let markets = self.manager.watched().to_vec();
                    let stream = self.stream.clone();
                    self.lag
                        .on_leader_move(&move_event, &markets, |t| stream.book(t), &self.executor)
                        .await;
                }

                Some(market_id) = self.lag_exit_rx.recv() => {
                    let stream = self.stream.clone();
                    self.lag
                        .handle_exit_request(&market_id, |t| stream.book(t), &self.executor);
                }

                Some(request) = self.removal_rx.recv() => {
                    self.executor.forget_market(&request.market_id);
                    self.manager.handle_removal(&request).await;
                }

                _ = discovery_tick.tick() => {
                    debug!("Discovery refresh");
                    let ranked = discovery::scan(&self.client, &self.config.discovery).await;
                    self.manager.refresh_pool(ranked);
                }
            }
        }

        self.shutdown(reporter).await;
        Ok(())
    }

    /// Marks leader feeds healthy while their trackers keep receiving
    /// samples. Move events are too rare to carry health on their own.
    fn mark_spot_health(&self) {
        let stale_ms = (self.config.health.stale_after_secs * 1000) as i64;
        let now_ms = chrono::Utc::now().timestamp_millis();
        for leader in &self.config.lag.leaders {
            let Some(tracker) = self.spot.tracker(&leader.symbol) else {
                continue;
            };
            let current_ts = tracker.read().current_timestamp_ms();
            if let Some(ts) = current_ts {
                if now_ms - ts < stale_ms {
                    self.health.mark(&format!("{FEED_SPOT}:{}", leader.symbol));
                }
            }
        }
    }

    /// One intra-venue pass over every watched market.
    async fn scan_watched(&mut self) {
        let markets = self.manager.watched().to_vec();
        let mut band_counts = [0usize; 5];

        for market in markets {
            let book_a = self.stream.book(&market.token_a);
            let book_b = self.stream.book(&market.token_b);

            let total_cost = match (&book_a, &book_b) {
                (Some(a), Some(b)) => match (a.best_ask(), b.best_ask()) {
                    (Some((ask_a, _)), Some((ask_b, _))) => Some(ask_a + ask_b),
                    _ => None,
                },
                _ => None,
            };

            let band = classify_cost(
                total_cost,
                self.scanner.cost_threshold(),
                self.config.watch.expensive_cost,
            );
            band_counts[match band {
                StatusBand::Arb => 0,
                StatusBand::Good => 1,
                StatusBand::Fair => 2,
                StatusBand::Expensive => 3,
                StatusBand::NoData => 4,
            }] += 1;

            if self.executor.note_band(&market.market_id, band) {
                let _ = self
                    .removal_tx
                    .send(RemovalRequest {
                        market_id: market.market_id.clone(),
                        reason: RemovalReason::Unfavorable,
                    })
                    .await;
                continue;
            }

            if band != StatusBand::Arb {
                continue;
            }
            let (Some(book_a), Some(book_b)) = (book_a, book_b) else {
                continue;
            };
            let Some(opportunity) = self.scanner.evaluate(&market, &book_a, &book_b) else {
                continue;
            };
            if self.executor.is_claimed(&market.market_id) {
                continue;
            }

            info!(
                market = %opportunity.market_title,
                total_cost = %opportunity.total_cost,
                net_profit = %opportunity.net_profit,
                "Arbitrage opportunity"
            );

            // Fire-and-forget; the claim inside execute_pair keeps this
            // exactly-once even when two ticks race.
            let executor = Arc::clone(&self.executor);
            let removal_tx = self.removal_tx.clone();
            tokio::spawn(async move {
                if executor.execute_pair(&opportunity).await {
                    let _ = removal_tx
                        .send(RemovalRequest {
                            market_id: opportunity.market_id.clone(),
                            reason: RemovalReason::Traded,
                        })
                        .await;
                }
            });
        }

        debug!(
            arb = band_counts[0],
            good = band_counts[1],
            fair = band_counts[2],
            expensive = band_counts[3],
            no_data = band_counts[4],
            "Scan summary"
        );
    }

    async fn on_book_event(&mut self, event: BookEvent) {
        match event {
            BookEvent::Snapshot { asset_id, .. } | BookEvent::Delta { asset_id, .. } => {
                self.health.mark(FEED_MARKET);
                let stream = self.stream.clone();
                self.lag
                    .on_book_update(&asset_id, |t| stream.book(t), &self.executor)
                    .await;
            }
            BookEvent::Trade { .. } => {
                self.health.mark(FEED_MARKET);
            }
            BookEvent::Connected => {
                info!("Market stream connected");
            }
            BookEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Market stream disconnected");
            }
        }
    }

    async fn shutdown(mut self, reporter: tokio::task::JoinHandle<()>) {
        reporter.abort();
        self.lag.shutdown();
        self.spot.shutdown();
        self.stream.shutdown().await;
        info!("Engine stopped");
    }
}
