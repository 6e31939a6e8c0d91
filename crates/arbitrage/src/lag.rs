//! Cross-venue lag arbitrage.
//!
//! The fast venue (spot) leads; follower markets on the slow venue reprice
//! seconds later. When a leader move exceeds the trigger threshold but a
//! matching follower market has barely moved and has been quiet past the
//! minimum lag window, the strategy buys the outcome the move favors,
//! holds through the catch-up, and exits on a timer or an early profit
//! target. A per-market cooldown blocks immediate re-entry.
//!
//! All state lives here: last-observed follower prices, open positions
//! (each owning its cancellable exit timer), and cooldowns. The engine
//! drives the strategy from its event loop, so there are no concurrent
//! writers.

use crate::executor::{ExecutionEngine, OrderIntent};
use crate::ledger::RowStatus;
use crate::parser::{Direction, ParserChain};
use chrono::{DateTime, Utc};
use polyarb_binance::{MoveDirection, MoveEvent};
use polyarb_core::{LagConfig, Leader, OrderDiscipline};
use polyarb_polymarket::{L2Book, Market};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Last observed price of a follower outcome token.
#[derive(Debug, Clone)]
struct FollowerRecord {
    price: Decimal,
    updated_at: DateTime<Utc>,
}

/// Whether a market's first outcome profits from the leader rising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketBias {
    Bullish,
    Bearish,
}

/// An open lag position.
#[derive(Debug)]
pub struct Position {
    pub market_id: String,
    pub market_title: String,
    pub token_id: String,
    pub outcome_label: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub size: Decimal,
    pub order_id: String,
    pub order_status: RowStatus,
    /// Timer that requests the timed exit; aborted on early exit/shutdown.
    exit_timer: Option<JoinHandle<()>>,
}

impl Position {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.exit_timer.take() {
            timer.abort();
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Hold duration elapsed.
    HoldExpired,
    /// Early profit target reached after the minimum hold.
    ProfitTarget,
    /// Process shutdown.
    Shutdown,
}

/// Cross-venue lag strategy state machine.
pub struct LagStrategy {
    config: LagConfig,
    parser: ParserChain,
    followers: HashMap<String, FollowerRecord>,
    positions: HashMap<String, Position>,
    cooldown_until: HashMap<String, DateTime<Utc>>,
    exit_tx: mpsc::Sender<String>,
}

impl LagStrategy {
    /// Creates the strategy. Timed exits arrive on the paired receiver as
    /// market ids; the engine routes them back into
    /// [`LagStrategy::handle_exit_request`].
    #[must_use]
    pub fn new(config: LagConfig, parser: ParserChain) -> (Self, mpsc::Receiver<String>) {
        let (exit_tx, exit_rx) = mpsc::channel(64);
        (
            Self {
                config,
                parser,
                followers: HashMap::new(),
                positions: HashMap::new(),
                cooldown_until: HashMap::new(),
                exit_tx,
            },
            exit_rx,
        )
    }

    /// Number of open positions.
    #[must_use]
    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    /// True while the market is blocked from re-entry.
    #[must_use]
    pub fn in_cooldown(&self, market_id: &str, now: DateTime<Utc>) -> bool {
        self.cooldown_until
            .get(market_id)
            .is_some_and(|until| now < *until)
    }

    /// Classifies a market title as bullish or bearish.
    ///
    /// Keyword rules first; the parser chain is consulted only when they
    /// say nothing, and anything still inconclusive defaults to bullish.
    #[must_use]
    pub fn classify(&self, question: &str) -> MarketBias {
        let q = question.to_lowercase();
        if q.contains("below") || q.contains("under") || q.contains("less than") {
            return MarketBias::Bearish;
        }
        if q.contains("above") || q.contains("over") || q.contains("reach") || q.contains("exceed")
        {
            return MarketBias::Bullish;
        }
        match self.parser.parse(question) {
            Some(parsed) if parsed.direction == Direction::Below => MarketBias::Bearish,
            _ => MarketBias::Bullish,
        }
    }

    /// Picks the outcome token to buy for a bias/move combination.
    ///
    /// Bullish markets profit from up-moves on their first outcome; every
    /// other cell of the table flips accordingly.
    #[must_use]
    pub fn choose_outcome<'m>(
        market: &'m Market,
        bias: MarketBias,
        direction: MoveDirection,
    ) -> (&'m str, &'m str) {
        match (bias, direction) {
            (MarketBias::Bullish, MoveDirection::Up) => (&market.token_a, &market.label_a),
            (MarketBias::Bullish, MoveDirection::Down) => (&market.token_b, &market.label_b),
            (MarketBias::Bearish, MoveDirection::Up) => (&market.token_b, &market.label_b),
            (MarketBias::Bearish, MoveDirection::Down) => (&market.token_a, &market.label_a),
        }
    }

    /// Records a follower price update and checks the early-exit target.
    pub async fn on_book_update<F>(
        &mut self,
        token_id: &str,
        lookup: F,
        executor: &ExecutionEngine,
    ) where
        F: Fn(&str) -> Option<L2Book>,
    {
        let Some(book) = lookup(token_id) else {
            return;
        };
        let Some((ask, _)) = book.best_ask() else {
            return;
        };

        self.followers.insert(
            token_id.to_string(),
            FollowerRecord {
                price: ask,
                updated_at: Utc::now(),
            },
        );

        // Early profit exit for a position holding this token.
        let candidate = self
            .positions
            .values()
            .find(|p| p.token_id == token_id)
            .map(|p| p.market_id.clone());
        if let Some(market_id) = candidate {
            let position = &self.positions[&market_id];
            let held = (Utc::now() - position.entry_time)
                .to_std()
                .unwrap_or_default();
            if held < Duration::from_secs(self.config.min_hold_secs) {
                return;
            }

            let exit_price = book.best_bid().map(|(p, _)| p).unwrap_or(ask);
            if position.entry_price <= Decimal::ZERO {
                return;
            }
            let profit_pct = (exit_price - position.entry_price) / position.entry_price;
            if profit_pct >= decimal_from_f64(self.config.min_exit_profit_pct) {
                self.close_position(&market_id, exit_price, ExitReason::ProfitTarget, executor);
            }
        }
    }

    /// Reacts to a leader move: finds lagging followers and opens positions.
    pub async fn on_leader_move<F>(
        &mut self,
        event: &MoveEvent,
        markets: &[Market],
        lookup: F,
        executor: &ExecutionEngine,
    ) where
        F: Fn(&str) -> Option<L2Book>,
    {
        let Some(leader) = self.leader_for(&event.symbol) else {
            return;
        };
        let keywords = leader.keywords.clone();
        let now = Utc::now();

        let related: Vec<Market> = markets
            .iter()
            .filter(|m| m.title_matches(&keywords))
            .cloned()
            .collect();
        if related.is_empty() {
            debug!(leader = %event.leader_name, "No follower markets for move");
            return;
        }

        for market in related {
            if self.positions.contains_key(&market.market_id)
                || self.in_cooldown(&market.market_id, now)
            {
                continue;
            }
            self.check_market(event, &market, &lookup, executor, now).await;
        }
    }

    async fn check_market<F>(
        &mut self,
        event: &MoveEvent,
        market: &Market,
        lookup: &F,
        executor: &ExecutionEngine,
        now: DateTime<Utc>,
    ) where
        F: Fn(&str) -> Option<L2Book>,
    {
        let bias = self.classify(&market.question);
        let (token_id, label) = Self::choose_outcome(market, bias, event.direction);
        let token_id = token_id.to_string();
        let label = label.to_string();

        let Some(book) = lookup(&token_id) else {
            return;
        };
        let Some((ask, ask_size)) = book.best_ask() else {
            return;
        };

        let Some(record) = self.followers.get(&token_id) else {
            // First observation of this token; remember it and wait.
            self.followers.insert(
                token_id,
                FollowerRecord {
                    price: ask,
                    updated_at: now,
                },
            );
            return;
        };

        if record.price <= Decimal::ZERO {
            return;
        }
        let follower_change_pct =
            ((ask - record.price) / record.price * Decimal::new(100, 0)).abs();
        let expected_pct =
            decimal_from_f64(self.config.passthrough_fraction * event.move_pct.abs());
        let staleness_secs = (now - record.updated_at).num_seconds();

        if follower_change_pct >= expected_pct || staleness_secs <= self.config.min_lag_secs {
            return;
        }

        info!(
            market = %market.question,
            leader = %event.leader_name,
            move_pct = event.move_pct,
            follower_change_pct = %follower_change_pct,
            staleness_secs,
            "Lag detected"
        );

        // Entry bound: assume the follower catches up by the expected
        // pass-through; the implied exit must still clear the profit target.
        if self.config.discipline == OrderDiscipline::Limit {
            let passthrough = expected_pct / Decimal::new(100, 0);
            let target = decimal_from_f64(self.config.min_exit_profit_pct);
            let max_entry =
                record.price * (Decimal::ONE + passthrough) / (Decimal::ONE + target);
            if ask > max_entry {
                debug!(
                    market = %market.question,
                    ask = %ask,
                    max_entry = %max_entry,
                    "Ask above entry bound, skipping"
                );
                return;
            }
        }

        let size = ask_size
            .min(self.config.max_notional / ask)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if size < Decimal::ONE {
            return;
        }

        self.open_position(market, token_id, label, ask, size, executor)
            .await;
    }

    async fn open_position(
        &mut self,
        market: &Market,
        token_id: String,
        label: String,
        entry_price: Decimal,
        size: Decimal,
        executor: &ExecutionEngine,
    ) {
        // Reserve the slot before the submission await so a second signal
        // for the same market cannot double-enter.
        self.positions.insert(
            market.market_id.clone(),
            Position {
                market_id: market.market_id.clone(),
                market_title: market.question.clone(),
                token_id: token_id.clone(),
                outcome_label: label.clone(),
                entry_price,
                entry_time: Utc::now(),
                size,
                order_id: String::new(),
                order_status: RowStatus::Failed,
                exit_timer: None,
            },
        );

        let outcome = executor
            .submit_order(&OrderIntent {
                token_id,
                outcome_label: label,
                market_title: market.question.clone(),
                price: entry_price,
                size,
            })
            .await;

        if !outcome.accepted() {
            warn!(market = %market.question, "Lag entry failed");
            self.positions.remove(&market.market_id);
            return;
        }

        let market_id = market.market_id.clone();
        let exit_tx = self.exit_tx.clone();
        let hold = Duration::from_secs(self.config.hold_secs);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            let _ = exit_tx.send(market_id).await;
        });

        if let Some(position) = self.positions.get_mut(&market.market_id) {
            position.order_id = outcome.order_id;
            position.order_status = outcome.status;
            position.exit_timer = Some(timer);
            info!(
                market = %position.market_title,
                outcome = %position.outcome_label,
                entry = %position.entry_price,
                size = %position.size,
                "Lag position opened"
            );
        }
    }

    /// Handles a timed exit request from a position's timer.
    pub fn handle_exit_request<F>(
        &mut self,
        market_id: &str,
        lookup: F,
        executor: &ExecutionEngine,
    ) where
        F: Fn(&str) -> Option<L2Book>,
    {
        let Some(position) = self.positions.get(market_id) else {
            // Already exited early; the timer fired into the void.
            return;
        };
        let exit_price = lookup(&position.token_id)
            .and_then(|book| book.best_bid().map(|(p, _)| p).or(book.best_ask().map(|(p, _)| p)))
            .unwrap_or(position.entry_price);
        self.close_position(market_id, exit_price, ExitReason::HoldExpired, executor);
    }

    fn close_position(
        &mut self,
        market_id: &str,
        exit_price: Decimal,
        reason: ExitReason,
        executor: &ExecutionEngine,
    ) {
        let Some(mut position) = self.positions.remove(market_id) else {
            return;
        };
        position.abort_timer();

        let profit_pct = if position.entry_price > Decimal::ZERO {
            (exit_price - position.entry_price) / position.entry_price * Decimal::new(100, 0)
        } else {
            Decimal::ZERO
        };
        info!(
            market = %position.market_title,
            entry = %position.entry_price,
            exit = %exit_price,
            profit_pct = %profit_pct,
            ?reason,
            "Lag position closed"
        );

        executor.record_lag_round_trip(
            &position.market_title,
            &position.outcome_label,
            position.entry_price,
            exit_price,
            position.size,
            &position.order_id,
            position.order_status,
        );

        self.cooldown_until.insert(
            market_id.to_string(),
            Utc::now() + chrono::Duration::seconds(self.config.cooldown_secs as i64),
        );
    }

    /// Aborts every outstanding exit timer. Open positions are left as-is;
    /// flattening on shutdown is out of scope.
    pub fn shutdown(&mut self) {
        for position in self.positions.values_mut() {
            position.abort_timer();
        }
        if !self.positions.is_empty() {
            warn!(
                open = self.positions.len(),
                "Shutting down with open lag positions"
            );
        }
    }

    fn leader_for(&self, symbol: &str) -> Option<&Leader> {
        self.config.leaders.iter().find(|l| l.symbol == symbol)
    }
}

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_str(&format!("{value:.8}")).unwrap_or(Decimal::ZERO)
}
