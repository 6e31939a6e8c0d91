//! Arbitrage strategies and execution for the polyarb trading system.
//!
//! Two strategies run over the same local order-book view:
//!
//! - **Intra-venue**: buy both outcomes of a binary market when their
//!   combined ask cost drifts below 1.0 by more than the fee-adjusted
//!   spread floor.
//! - **Cross-venue lag**: when a leader instrument on the fast venue moves
//!   and a matching follower market has not repriced yet, buy the outcome
//!   the move favors and exit after the catch-up.
//!
//! Around them: an execution engine with a dedup guard and bounded
//! concurrency, watch-set rotation fed by a scored candidate pool, feed
//! health tracking, and an append-only CSV ledger.

pub mod engine;
pub mod executor;
pub mod health;
pub mod intra;
pub mod lag;
pub mod ledger;
pub mod parser;
pub mod watch;

pub use engine::Engine;
pub use executor::{
    classify_cost, ExecutionEngine, LiveGateway, OrderGateway, OrderIntent, OrderOutcome,
    SimGateway, StatusBand,
};
pub use health::{FeedHealth, HealthMonitor};
pub use intra::{IntraOpportunity, IntraScanner};
pub use lag::{ExitReason, LagStrategy, MarketBias, Position};
pub use ledger::{Ledger, LedgerError, OrderRow, RowStatus, TradeRow};
pub use parser::{Direction, ParsedQuestion, ParserChain, QuestionParser, RegexParser, Target};
pub use watch::{removal_queue, RemovalReason, RemovalRequest, WatchSetManager};
