//! Append-only CSV ledger.
//!
//! Two files: one row per submitted order, one row per completed arbitrage
//! trade. Headers are written when a file is created; subsequent runs
//! append. A write failure is logged and swallowed — the ledger must never
//! take the trading loop down.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fs::OpenOptions;
use std::path::Path;
use thiserror::Error;
use tracing::error;

/// Errors from ledger I/O.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Terminal status of an order or trade row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Simulated,
    Filled,
    Failed,
}

impl RowStatus {
    fn as_str(self) -> &'static str {
        match self {
            RowStatus::Simulated => "SIMULATED",
            RowStatus::Filled => "FILLED",
            RowStatus::Failed => "FAILED",
        }
    }
}

/// One submitted order.
#[derive(Debug, Clone)]
pub struct OrderRow {
    pub timestamp: DateTime<Utc>,
    pub market_title: String,
    pub outcome_label: String,
    pub token_id: String,
    pub side: String,
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: String,
    pub status: RowStatus,
}

/// One completed arbitrage trade (both legs, or a lag round trip).
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub market_title: String,
    pub label_a: String,
    pub price_a: Decimal,
    pub label_b: String,
    pub price_b: Decimal,
    pub size: Decimal,
    pub total_cost: Decimal,
    pub fees: Decimal,
    pub gas: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub order_id_a: String,
    pub order_id_b: String,
    pub status: RowStatus,
}

const ORDER_HEADER: [&str; 9] = [
    "Timestamp", "Market", "Outcome", "Token_ID", "Side", "Price", "Size", "Order_ID", "Status",
];

const TRADE_HEADER: [&str; 16] = [
    "Timestamp",
    "Strategy",
    "Market",
    "Outcome_A",
    "Price_A",
    "Outcome_B",
    "Price_B",
    "Size",
    "Total_Cost",
    "Fees",
    "Gas",
    "Gross_Profit",
    "Net_Profit",
    "Order_ID_A",
    "Order_ID_B",
    "Status",
];

struct LedgerFile {
    writer: csv::Writer<std::fs::File>,
}

impl LedgerFile {
    fn open(path: &Path, header: &[&str]) -> Result<Self, LedgerError> {
        let fresh = !path.exists()
            || std::fs::metadata(path)
                .map(|m| m.len() == 0)
                .unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }

    fn write(&mut self, record: &[String]) -> Result<(), LedgerError> {
        self.writer.write_record(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Append-only order and trade log.
pub struct Ledger {
    orders: Mutex<LedgerFile>,
    trades: Mutex<LedgerFile>,
}

impl Ledger {
    /// Opens (creating if needed) both ledger files.
    ///
    /// # Errors
    ///
    /// Returns an error when either file cannot be opened or the header
    /// cannot be written.
    pub fn open(orders_path: impl AsRef<Path>, trades_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self {
            orders: Mutex::new(LedgerFile::open(orders_path.as_ref(), &ORDER_HEADER)?),
            trades: Mutex::new(LedgerFile::open(trades_path.as_ref(), &TRADE_HEADER)?),
        })
    }

    /// Appends an order row. Failures are logged, not propagated.
    pub fn record_order(&self, row: &OrderRow) {
        let record = vec![
            row.timestamp.to_rfc3339(),
            row.market_title.clone(),
            row.outcome_label.clone(),
            row.token_id.clone(),
            row.side.clone(),
            format!("{:.4}", row.price),
            format!("{:.2}", row.size),
            row.order_id.clone(),
            row.status.as_str().to_string(),
        ];
        if let Err(e) = self.orders.lock().write(&record) {
            error!(error = %e, "Failed to append order row");
        }
    }

    /// Appends a trade row. Failures are logged, not propagated.
    pub fn record_trade(&self, row: &TradeRow) {
        let record = vec![
            row.timestamp.to_rfc3339(),
            row.strategy.clone(),
            row.market_title.clone(),
            row.label_a.clone(),
            format!("{:.4}", row.price_a),
            row.label_b.clone(),
            format!("{:.4}", row.price_b),
            format!("{:.2}", row.size),
            format!("{:.4}", row.total_cost),
            format!("{:.4}", row.fees),
            format!("{:.4}", row.gas),
            format!("{:.4}", row.gross_profit),
            format!("{:.4}", row.net_profit),
            row.order_id_a.clone(),
            row.order_id_b.clone(),
            row.status.as_str().to_string(),
        ];
        if let Err(e) = self.trades.lock().write(&record) {
            error!(error = %e, "Failed to append trade row");
        }
    }
}
