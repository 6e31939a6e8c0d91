//! Configuration types for the polyarb trading system.
//!
//! Every section carries a `Default` with the operational values the system
//! ships with, so a partial `Config.toml` only needs to override what it
//! changes. Monetary thresholds are [`Decimal`]; percentage moves on the
//! leader feed stay `f64` because they are ratios, not prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: FeedConfig,
    pub discovery: DiscoveryConfig,
    pub watch: WatchConfig,
    pub intra: IntraConfig,
    pub lag: LagConfig,
    pub execution: ExecutionConfig,
    pub health: HealthConfig,
}

/// Connection settings for both venue feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Polymarket CLOB market-channel WebSocket URL.
    pub market_ws_url: String,
    /// Binance spot WebSocket base URL (per-stream path appended).
    pub spot_ws_url: String,
    /// Gamma catalog REST base URL.
    pub catalog_url: String,
    /// CLOB REST base URL (book snapshots, order submission).
    pub clob_url: String,
    /// Client ping interval in seconds.
    pub ping_interval_secs: u64,
    /// Force a reconnect when no message arrives for this long.
    pub idle_timeout_secs: u64,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_secs: u64,
    /// Event channel buffer size.
    pub channel_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            market_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            spot_ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            catalog_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            ping_interval_secs: 30,
            idle_timeout_secs: 60,
            reconnect_delay_secs: 5,
            channel_buffer_size: 1000,
        }
    }
}

/// Market discovery scan and scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Catalog page size per request.
    pub page_size: usize,
    /// Stop scanning after examining this many catalog entries.
    pub scan_budget: usize,
    /// Reject candidates below this resting liquidity (USDC).
    pub min_liquidity: Decimal,
    /// Reject candidates below this traded volume (USDC).
    pub min_volume: Decimal,
    /// Reject candidates ending sooner than this many hours out.
    pub min_horizon_hours: i64,
    /// Liquidity at or above this earns the full liquidity score.
    pub liquidity_cap: Decimal,
    /// Volume at or above this earns the full volume score.
    pub volume_cap: Decimal,
    /// Seconds between discovery refresh cycles.
    pub refresh_interval_secs: u64,
    /// Requests per minute against the catalog API.
    pub requests_per_minute: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            scan_budget: 1000,
            min_liquidity: Decimal::new(500, 0),
            min_volume: Decimal::new(100, 0),
            min_horizon_hours: 1,
            liquidity_cap: Decimal::new(50_000, 0),
            volume_cap: Decimal::new(100_000, 0),
            refresh_interval_secs: 900,
            requests_per_minute: 30,
        }
    }
}

/// Watch-set sizing and rotation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Maximum number of markets under live subscription.
    pub max_watched: usize,
    /// Consecutive expensive scans before a market is rotated out.
    pub unfavorable_limit: u32,
    /// Combined best-ask cost at or above this counts as expensive.
    pub expensive_cost: Decimal,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_watched: 50,
            unfavorable_limit: 10,
            expensive_cost: Decimal::new(1002, 3),
        }
    }
}

/// Venue fee regime for the intra-venue strategy.
///
/// Most Polymarket markets trade fee-free; the US-regulated venue charges a
/// one-basis-point taker fee on notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Standard,
    Us,
}

impl MarketType {
    /// Taker fee rate applied to notional.
    #[must_use]
    pub fn taker_fee_rate(self) -> Decimal {
        match self {
            MarketType::Standard => Decimal::ZERO,
            MarketType::Us => Decimal::new(1, 4),
        }
    }
}

/// Intra-venue (sum-of-asks) strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntraConfig {
    /// Gross spread below 1.0 required to flag an opportunity.
    pub min_profit_spread: Decimal,
    /// Net per-unit spread required after fees and gas.
    pub min_net_spread: Decimal,
    /// Notional cap per opportunity (USDC).
    pub max_notional: Decimal,
    /// Reject trades below this share count.
    pub min_viable_size: Decimal,
    /// Fee regime for watched markets.
    pub market_type: MarketType,
    /// Strategy scan tick in milliseconds.
    pub scan_interval_ms: u64,
}

impl Default for IntraConfig {
    fn default() -> Self {
        Self {
            min_profit_spread: Decimal::new(5, 3),
            min_net_spread: Decimal::new(2, 3),
            max_notional: Decimal::new(20_000, 0),
            min_viable_size: Decimal::new(2, 0),
            market_type: MarketType::Standard,
            scan_interval_ms: 20,
        }
    }
}

/// A leader instrument on the fast venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leader {
    /// Stream symbol, e.g. `btcusdt`.
    pub symbol: String,
    /// Human name used in logs and ledger rows.
    pub name: String,
    /// Title keywords that tie follower markets to this leader.
    pub keywords: Vec<String>,
}

/// Entry discipline for lag trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDiscipline {
    /// Only enter when the ask clears the computed entry bound.
    Limit,
    /// Enter at the current ask without a bound check.
    Market,
}

/// Cross-venue lag strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Leader instruments to stream from the fast venue.
    pub leaders: Vec<Leader>,
    /// Leader move (percent) that arms the lag check.
    pub move_threshold_pct: f64,
    /// Trailing window for the leader move, in seconds.
    pub detection_window_secs: i64,
    /// Follower must be at least this stale, in seconds.
    pub min_lag_secs: i64,
    /// Fraction of the leader move the follower is expected to pass through.
    pub passthrough_fraction: f64,
    /// Hold duration before the timed exit fires, in seconds.
    pub hold_secs: u64,
    /// Earliest the profit-target exit may fire, in seconds.
    pub min_hold_secs: u64,
    /// Unrealized profit (fraction of entry) that permits an early exit.
    pub min_exit_profit_pct: f64,
    /// Per-market re-entry cooldown after an exit, in seconds.
    pub cooldown_secs: u64,
    /// Notional cap per lag entry (USDC).
    pub max_notional: Decimal,
    /// Limit- or market-order entry discipline.
    pub discipline: OrderDiscipline,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            leaders: vec![
                Leader {
                    symbol: "btcusdt".to_string(),
                    name: "Bitcoin".to_string(),
                    keywords: vec!["bitcoin".to_string(), "btc".to_string()],
                },
                Leader {
                    symbol: "ethusdt".to_string(),
                    name: "Ethereum".to_string(),
                    keywords: vec!["ethereum".to_string(), "eth".to_string()],
                },
                Leader {
                    symbol: "solusdt".to_string(),
                    name: "Solana".to_string(),
                    keywords: vec!["solana".to_string(), "sol".to_string()],
                },
            ],
            move_threshold_pct: 0.2,
            detection_window_secs: 10,
            min_lag_secs: 2,
            passthrough_fraction: 0.1,
            hold_secs: 30,
            min_hold_secs: 5,
            min_exit_profit_pct: 0.01,
            cooldown_secs: 300,
            max_notional: Decimal::new(100, 0),
            discipline: OrderDiscipline::Limit,
        }
    }
}

/// Execution mode, concurrency, and fee/gas accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Record trades to the ledger instead of submitting them.
    pub simulation: bool,
    /// Bound on concurrent in-flight executions.
    pub max_concurrent: usize,
    /// Polygon gas cost charged per submitted order (USD).
    pub gas_cost_per_order: Decimal,
    /// When true (relayer covers gas) no gas is charged.
    pub gasless: bool,
    /// Order-level ledger file.
    pub orders_csv: String,
    /// Completed-trade ledger file.
    pub trades_csv: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            simulation: true,
            max_concurrent: 4,
            gas_cost_per_order: Decimal::new(5, 2),
            gasless: false,
            orders_csv: "sim_orders.csv".to_string(),
            trades_csv: "arbitrage_trades.csv".to_string(),
        }
    }
}

impl ExecutionConfig {
    /// Gas charged for a single order under the current settings.
    #[must_use]
    pub fn gas_per_order(&self) -> Decimal {
        if self.gasless {
            Decimal::ZERO
        } else {
            self.gas_cost_per_order
        }
    }
}

/// Feed staleness reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A feed with no update for this long is reported stale.
    pub stale_after_secs: u64,
    /// Seconds between health reports.
    pub report_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 50,
            report_interval_secs: 60,
        }
    }
}
