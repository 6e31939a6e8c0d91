//! Order execution: gateways, dedup guard, and the unfavorable counter.
//!
//! Two gateways sit behind one trait: the simulated gateway fabricates a
//! confirmation and the live gateway submits to the venue's order endpoint.
//! The engine wraps either with the machinery both strategies share — a
//! per-market executed set populated *before* submission (closing the race
//! between two fast scan ticks), a semaphore bounding in-flight
//! executions, and the per-market unfavorable counter that drives proactive
//! rotation.

use crate::intra::IntraOpportunity;
use crate::ledger::{Ledger, OrderRow, RowStatus, TradeRow};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use polyarb_polymarket::{OrderRequest, VenueClient};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// A buy order one of the strategies wants filled.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub token_id: String,
    pub outcome_label: String,
    pub market_title: String,
    pub price: Decimal,
    pub size: Decimal,
}

/// Result of submitting one order.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order_id: String,
    pub status: RowStatus,
    pub error: Option<String>,
}

impl OrderOutcome {
    /// True unless the order failed outright.
    #[must_use]
    pub fn accepted(&self) -> bool {
        !matches!(self.status, RowStatus::Failed)
    }
}

/// Order submission boundary.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submits a buy order; never panics, failures map to a failed outcome.
    async fn place_order(&self, intent: &OrderIntent) -> OrderOutcome;
}

/// Simulated gateway: every order fills with a synthetic id.
pub struct SimGateway;

#[async_trait]
impl OrderGateway for SimGateway {
    async fn place_order(&self, intent: &OrderIntent) -> OrderOutcome {
        let order_id = format!("sim-{}", &Uuid::new_v4().simple().to_string()[..8]);
        info!(
            outcome = %intent.outcome_label,
            price = %intent.price,
            size = %intent.size,
            order_id = %order_id,
            "Simulated order"
        );
        OrderOutcome {
            order_id,
            status: RowStatus::Simulated,
            error: None,
        }
    }
}

/// Live gateway: submits to the venue's order endpoint.
pub struct LiveGateway {
    client: Arc<VenueClient>,
}

impl LiveGateway {
    #[must_use]
    pub fn new(client: Arc<VenueClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderGateway for LiveGateway {
    async fn place_order(&self, intent: &OrderIntent) -> OrderOutcome {
        let request = OrderRequest {
            token_id: intent.token_id.clone(),
            side: "BUY".to_string(),
            price: intent.price,
            size: intent.size,
        };

        match self.client.place_order(&request).await {
            Ok(response) if response.success => {
                let order_id = response.order_id.unwrap_or_else(|| "unknown".to_string());
                info!(
                    outcome = %intent.outcome_label,
                    price = %intent.price,
                    size = %intent.size,
                    order_id = %order_id,
                    "Live order placed"
                );
                OrderOutcome {
                    order_id,
                    status: RowStatus::Filled,
                    error: None,
                }
            }
            Ok(response) => {
                warn!(
                    outcome = %intent.outcome_label,
                    error = ?response.error_msg,
                    "Live order rejected"
                );
                OrderOutcome {
                    order_id: response.order_id.unwrap_or_default(),
                    status: RowStatus::Failed,
                    error: response.error_msg,
                }
            }
            Err(e) => {
                warn!(outcome = %intent.outcome_label, error = %e, "Live order errored");
                OrderOutcome {
                    order_id: String::new(),
                    status: RowStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Scan-time status of a watched market, by combined best-ask cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBand {
    /// Below the arbitrage threshold.
    Arb,
    /// Spread is healthy but not tradeable yet.
    Good,
    /// Roughly fair-priced.
    Fair,
    /// Combined cost at or above the expensive band edge.
    Expensive,
    /// One or both asks missing.
    NoData,
}

/// Classifies a combined best-ask cost into a status band.
#[must_use]
pub fn classify_cost(
    total_cost: Option<Decimal>,
    arb_threshold: Decimal,
    expensive_cost: Decimal,
) -> StatusBand {
    match total_cost {
        None => StatusBand::NoData,
        Some(cost) => {
            if cost < arb_threshold {
                StatusBand::Arb
            } else if cost < Decimal::new(995, 3) {
                StatusBand::Good
            } else if cost < expensive_cost {
                StatusBand::Fair
            } else {
                StatusBand::Expensive
            }
        }
    }
}

/// Shared execution machinery over a gateway.
pub struct ExecutionEngine {
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<Ledger>,
    executed: Mutex<HashSet<String>>,
    inflight: Arc<Semaphore>,
    unfavorable: Mutex<HashMap<String, u32>>,
    unfavorable_limit: u32,
}

impl ExecutionEngine {
    /// Creates an engine with the given concurrency bound and rotation limit.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<Ledger>,
        max_concurrent: usize,
        unfavorable_limit: u32,
    ) -> Self {
        Self {
            gateway,
            ledger,
            executed: Mutex::new(HashSet::new()),
            inflight: Arc::new(Semaphore::new(max_concurrent.max(1))),
            unfavorable: Mutex::new(HashMap::new()),
            unfavorable_limit,
        }
    }

    /// Claims an opportunity key. Returns false when it was already claimed,
    /// in which case the caller must not submit.
    pub fn try_claim(&self, key: &str) -> bool {
        self.executed.lock().insert(key.to_string())
    }

    /// Rolls a claim back after a failed execution so a later tick may retry.
    pub fn release(&self, key: &str) {
        self.executed.lock().remove(key);
    }

    /// True when the key has been claimed.
    #[must_use]
    pub fn is_claimed(&self, key: &str) -> bool {
        self.executed.lock().contains(key)
    }

    /// Submits one order under the concurrency bound and records it.
    pub async fn submit_order(&self, intent: &OrderIntent) -> OrderOutcome {
        let _permit = self.inflight.acquire().await.ok();
        let outcome = self.gateway.place_order(intent).await;
        self.ledger.record_order(&OrderRow {
            timestamp: Utc::now(),
            market_title: intent.market_title.clone(),
            outcome_label: intent.outcome_label.clone(),
            token_id: intent.token_id.clone(),
            side: "BUY".to_string(),
            price: intent.price,
            size: intent.size,
            order_id: outcome.order_id.clone(),
            status: outcome.status,
        });
        outcome
    }

    /// Executes both legs of an intra-venue opportunity.
    ///
    /// The market key is claimed before submission; on any leg failure the
    /// claim is rolled back and the market is left in the watch set.
    /// Returns true when both legs were accepted.
    pub async fn execute_pair(&self, opp: &IntraOpportunity) -> bool {
        if !self.try_claim(&opp.market_id) {
            return false;
        }

        let _permit = self.inflight.acquire().await.ok();

        let leg_a = OrderIntent {
            token_id: opp.token_a.clone(),
            outcome_label: opp.label_a.clone(),
            market_title: opp.market_title.clone(),
            price: opp.ask_a,
            size: opp.size,
        };
        let leg_b = OrderIntent {
            token_id: opp.token_b.clone(),
            outcome_label: opp.label_b.clone(),
            market_title: opp.market_title.clone(),
            price: opp.ask_b,
            size: opp.size,
        };

        let (outcome_a, outcome_b) = tokio::join!(
            self.gateway.place_order(&leg_a),
            self.gateway.place_order(&leg_b)
        );

        let now = Utc::now();
        for (intent, outcome) in [(&leg_a, &outcome_a), (&leg_b, &outcome_b)] {
            self.ledger.record_order(&OrderRow {
                timestamp: now,
                market_title: intent.market_title.clone(),
                outcome_label: intent.outcome_label.clone(),
                token_id: intent.token_id.clone(),
                side: "BUY".to_string(),
                price: intent.price,
                size: intent.size,
                order_id: outcome.order_id.clone(),
                status: outcome.status,
            });
        }

        let both_accepted = outcome_a.accepted() && outcome_b.accepted();
        let status = if !both_accepted {
            RowStatus::Failed
        } else {
            outcome_a.status
        };

        self.ledger.record_trade(&TradeRow {
            timestamp: now,
            strategy: "intra".to_string(),
            market_title: opp.market_title.clone(),
            label_a: opp.label_a.clone(),
            price_a: opp.ask_a,
            label_b: opp.label_b.clone(),
            price_b: opp.ask_b,
            size: opp.size,
            total_cost: opp.total_cost,
            fees: opp.taker_fees,
            gas: opp.gas_cost,
            gross_profit: opp.gross_profit,
            net_profit: opp.net_profit,
            order_id_a: outcome_a.order_id.clone(),
            order_id_b: outcome_b.order_id.clone(),
            status,
        });

        if both_accepted {
            info!(
                market = %opp.market_title,
                total_cost = %opp.total_cost,
                size = %opp.size,
                net_profit = %opp.net_profit,
                "Arbitrage executed"
            );
        } else {
            warn!(market = %opp.market_title, "Arbitrage execution failed, releasing claim");
            self.release(&opp.market_id);
        }

        both_accepted
    }

    /// Records a scan-time status band for a market.
    ///
    /// The expensive band increments the per-market counter; any other band
    /// resets it. Returns true exactly once when the counter crosses the
    /// limit, signaling the caller to rotate the market out.
    pub fn note_band(&self, market_id: &str, band: StatusBand) -> bool {
        let mut counters = self.unfavorable.lock();
        if band == StatusBand::Expensive {
            let count = counters.entry(market_id.to_string()).or_insert(0);
            *count += 1;
            if *count > self.unfavorable_limit {
                counters.remove(market_id);
                return true;
            }
        } else {
            counters.insert(market_id.to_string(), 0);
        }
        false
    }

    /// Clears per-market counters for a retired market.
    pub fn forget_market(&self, market_id: &str) {
        self.unfavorable.lock().remove(market_id);
    }

    /// Writes the trade row for a completed lag round trip.
    #[allow(clippy::too_many_arguments)]
    pub fn record_lag_round_trip(
        &self,
        market_title: &str,
        outcome_label: &str,
        entry_price: Decimal,
        exit_price: Decimal,
        size: Decimal,
        order_id: &str,
        status: RowStatus,
    ) {
        let gross = (exit_price - entry_price) * size;
        self.ledger.record_trade(&TradeRow {
            timestamp: Utc::now(),
            strategy: "lag".to_string(),
            market_title: market_title.to_string(),
            label_a: outcome_label.to_string(),
            price_a: entry_price,
            label_b: outcome_label.to_string(),
            price_b: exit_price,
            size,
            total_cost: entry_price * size,
            fees: Decimal::ZERO,
            gas: Decimal::ZERO,
            gross_profit: gross,
            net_profit: gross,
            order_id_a: order_id.to_string(),
            order_id_b: String::new(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_ledger() -> (Arc<Ledger>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("o.csv"), dir.path().join("t.csv")).unwrap();
        (Arc::new(ledger), dir)
    }

    fn opportunity() -> IntraOpportunity {
        IntraOpportunity {
            market_id: "m1".to_string(),
            market_title: "Test market".to_string(),
            token_a: "t1".to_string(),
            token_b: "t2".to_string(),
            label_a: "Yes".to_string(),
            label_b: "No".to_string(),
            ask_a: dec!(0.40),
            ask_b: dec!(0.55),
            total_cost: dec!(0.95),
            size: dec!(100),
            gross_profit: dec!(5),
            taker_fees: dec!(0),
            gas_cost: dec!(0.10),
            net_profit: dec!(4.90),
        }
    }

    /// Gateway that counts submissions and fails on demand.
    struct CountingGateway {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl OrderGateway for CountingGateway {
        async fn place_order(&self, _intent: &OrderIntent) -> OrderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                OrderOutcome {
                    order_id: String::new(),
                    status: RowStatus::Failed,
                    error: Some("rejected".to_string()),
                }
            } else {
                OrderOutcome {
                    order_id: "ok-1".to_string(),
                    status: RowStatus::Filled,
                    error: None,
                }
            }
        }
    }

    #[tokio::test]
    async fn test_sim_gateway_always_fills() {
        let gateway = SimGateway;
        let outcome = gateway
            .place_order(&OrderIntent {
                token_id: "t1".to_string(),
                outcome_label: "Yes".to_string(),
                market_title: "m".to_string(),
                price: dec!(0.4),
                size: dec!(10),
            })
            .await;
        assert_eq!(outcome.status, RowStatus::Simulated);
        assert!(outcome.order_id.starts_with("sim-"));
        assert!(outcome.accepted());
    }

    #[tokio::test]
    async fn test_execute_pair_submits_both_legs_once() {
        let (ledger, _dir) = test_ledger();
        let gateway = Arc::new(CountingGateway {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let engine = ExecutionEngine::new(gateway.clone(), ledger, 4, 10);

        assert!(engine.execute_pair(&opportunity()).await);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
        assert!(engine.is_claimed("m1"));
    }

    #[tokio::test]
    async fn test_dedup_blocks_second_execution() {
        let (ledger, _dir) = test_ledger();
        let gateway = Arc::new(CountingGateway {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let engine = ExecutionEngine::new(gateway.clone(), ledger, 4, 10);

        let opp = opportunity();
        assert!(engine.execute_pair(&opp).await);
        // Second detection of the same opportunity does nothing.
        assert!(!engine.execute_pair(&opp).await);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_execution_rolls_back_claim() {
        let (ledger, _dir) = test_ledger();
        let gateway = Arc::new(CountingGateway {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let engine = ExecutionEngine::new(gateway.clone(), ledger, 4, 10);

        assert!(!engine.execute_pair(&opportunity()).await);
        // Claim rolled back: a later tick may retry.
        assert!(!engine.is_claimed("m1"));
    }

    #[tokio::test]
    async fn test_order_rows_written_for_both_legs() {
        let dir = tempfile::tempdir().unwrap();
        let orders = dir.path().join("o.csv");
        let ledger =
            Arc::new(Ledger::open(&orders, dir.path().join("t.csv")).unwrap());
        let engine = ExecutionEngine::new(Arc::new(SimGateway), ledger, 4, 10);

        engine.execute_pair(&opportunity()).await;

        let content = std::fs::read_to_string(&orders).unwrap();
        // Header plus one row per leg.
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_classify_cost_bands() {
        let arb = dec!(0.99);
        let expensive = dec!(1.002);
        assert_eq!(classify_cost(None, arb, expensive), StatusBand::NoData);
        assert_eq!(classify_cost(Some(dec!(0.95)), arb, expensive), StatusBand::Arb);
        assert_eq!(classify_cost(Some(dec!(0.992)), arb, expensive), StatusBand::Good);
        assert_eq!(classify_cost(Some(dec!(0.999)), arb, expensive), StatusBand::Fair);
        assert_eq!(classify_cost(Some(dec!(1.01)), arb, expensive), StatusBand::Expensive);
    }

    #[tokio::test]
    async fn test_unfavorable_counter_triggers_once() {
        let (ledger, _dir) = test_ledger();
        let engine = ExecutionEngine::new(Arc::new(SimGateway), ledger, 4, 3);

        for _ in 0..3 {
            assert!(!engine.note_band("m1", StatusBand::Expensive));
        }
        assert!(engine.note_band("m1", StatusBand::Expensive));
        // Counter cleared after firing.
        assert!(!engine.note_band("m1", StatusBand::Expensive));
    }

    #[tokio::test]
    async fn test_unfavorable_counter_resets_on_better_band() {
        let (ledger, _dir) = test_ledger();
        let engine = ExecutionEngine::new(Arc::new(SimGateway), ledger, 4, 3);

        engine.note_band("m1", StatusBand::Expensive);
        engine.note_band("m1", StatusBand::Expensive);
        engine.note_band("m1", StatusBand::Good);
        for _ in 0..3 {
            assert!(!engine.note_band("m1", StatusBand::Expensive));
        }
        assert!(engine.note_band("m1", StatusBand::Expensive));
    }
}
