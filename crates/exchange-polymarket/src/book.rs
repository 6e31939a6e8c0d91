//! Local L2 order book rebuilt from snapshot and delta messages.
//!
//! One [`L2Book`] per outcome token. Snapshots replace every level;
//! deltas replace or remove a single level (size zero removes). A level
//! with zero size is never stored, so the best bid/ask is always the
//! extreme key among present levels.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    /// Buying (resting on bids, taking from asks).
    Buy,
    /// Selling (resting on asks, taking from bids).
    Sell,
}

/// L2 order book with incremental update support.
///
/// Bids sort descending (via `Reverse`), asks ascending, so the best level
/// on either side is the first map entry.
#[derive(Debug, Clone)]
pub struct L2Book {
    /// Token ID this order book represents.
    pub token_id: String,
    /// Bid levels: price -> size, sorted descending by price.
    pub bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Ask levels: price -> size, sorted ascending by price.
    pub asks: BTreeMap<Decimal, Decimal>,
    /// Timestamp of last update in milliseconds.
    pub last_update_ms: Option<i64>,
}

impl L2Book {
    /// Creates a new empty order book for the given token.
    #[must_use]
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_ms: None,
        }
    }

    /// Returns the best (highest) bid as a `(price, size)` pair.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next().map(|(r, s)| (r.0, *s))
    }

    /// Returns the best (lowest) ask as a `(price, size)` pair.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(p, s)| (*p, *s))
    }

    /// Returns the bid-ask spread, if both sides have liquidity.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Returns the mid price, if both sides have liquidity.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Applies a full snapshot, replacing all existing levels.
    ///
    /// Zero-size levels in the snapshot are dropped rather than stored.
    pub fn apply_snapshot(&mut self, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) {
        self.bids.clear();
        self.asks.clear();
        for (price, size) in bids {
            if size > Decimal::ZERO {
                self.bids.insert(Reverse(price), size);
            }
        }
        for (price, size) in asks {
            if size > Decimal::ZERO {
                self.asks.insert(price, size);
            }
        }
    }

    /// Applies a delta to a single price level.
    ///
    /// Size zero (or negative) removes the level; any other size replaces it.
    /// Replaying the same delta is a no-op in effect.
    pub fn apply_level(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Buy => {
                if size <= Decimal::ZERO {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Sell => {
                if size <= Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }
    }

    /// Returns total bid depth (sum of all bid sizes).
    #[must_use]
    pub fn total_bid_depth(&self) -> Decimal {
        self.bids.values().copied().sum()
    }

    /// Returns total ask depth (sum of all ask sizes).
    #[must_use]
    pub fn total_ask_depth(&self) -> Decimal {
        self.asks.values().copied().sum()
    }

    /// Returns the number of bid levels.
    #[must_use]
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Returns the number of ask levels.
    #[must_use]
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Checks if the order book has any liquidity on either side.
    #[must_use]
    pub fn has_liquidity(&self) -> bool {
        !self.bids.is_empty() || !self.asks.is_empty()
    }

    /// Checks that both sides carry at least one level.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}

impl Default for L2Book {
    fn default() -> Self {
        Self::new(String::new())
    }
}
