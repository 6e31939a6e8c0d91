//! Rolling leader price history and move detection.
//!
//! One [`LeaderTracker`] per leader instrument holds a bounded window of
//! `(timestamp, price)` samples. [`LeaderTracker::detect_move`] reports when
//! the price changed by more than a threshold within the trailing detection
//! window; the lag strategy consumes those reports as its trigger.

use std::collections::VecDeque;

/// Maximum samples retained per leader (about 5 minutes at ~10 updates/sec).
const MAX_HISTORY: usize = 3000;

/// A single leader price sample.
#[derive(Debug, Clone, Copy)]
pub struct PriceSample {
    /// Price in quote units.
    pub price: f64,
    /// Timestamp in milliseconds since epoch.
    pub timestamp_ms: i64,
}

/// Direction of a detected leader move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// A leader price move exceeding the detection threshold.
#[derive(Debug, Clone)]
pub struct MoveEvent {
    /// Stream symbol, e.g. `btcusdt`.
    pub symbol: String,
    /// Leader name for logs and ledger rows.
    pub leader_name: String,
    /// Price at the start of the detection window.
    pub start_price: f64,
    /// Current price.
    pub current_price: f64,
    /// Signed percentage change over the window.
    pub move_pct: f64,
    /// Up or down.
    pub direction: MoveDirection,
    /// Detection timestamp in milliseconds.
    pub detected_at_ms: i64,
}

/// Fixed-capacity rolling window of leader prices.
#[derive(Debug)]
pub struct LeaderTracker {
    /// Samples, newest first.
    samples: VecDeque<PriceSample>,
    current: Option<PriceSample>,
}

impl Default for LeaderTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_HISTORY),
            current: None,
        }
    }

    /// Records a new price sample, evicting the oldest beyond capacity.
    pub fn update(&mut self, price: f64, timestamp_ms: i64) {
        if price <= 0.0 {
            return;
        }
        let sample = PriceSample {
            price,
            timestamp_ms,
        };
        self.current = Some(sample);
        self.samples.push_front(sample);
        while self.samples.len() > MAX_HISTORY {
            self.samples.pop_back();
        }
    }

    /// Returns the most recent price.
    #[must_use]
    pub fn current_price(&self) -> Option<f64> {
        self.current.map(|s| s.price)
    }

    /// Returns the most recent sample timestamp.
    #[must_use]
    pub fn current_timestamp_ms(&self) -> Option<i64> {
        self.current.map(|s| s.timestamp_ms)
    }

    /// Percentage change over the trailing window.
    ///
    /// Anchors at the newest sample at or before the window start, falling
    /// back to the oldest sample when the window predates all history.
    #[must_use]
    pub fn change_over(&self, window_ms: i64) -> Option<f64> {
        let current = self.current?;
        let cutoff = current.timestamp_ms - window_ms;

        let anchor = self
            .samples
            .iter()
            .find(|s| s.timestamp_ms <= cutoff)
            .or_else(|| self.samples.back())?;

        if anchor.timestamp_ms == current.timestamp_ms || anchor.price <= 0.0 {
            return Some(0.0);
        }

        Some((current.price - anchor.price) / anchor.price * 100.0)
    }

    /// Checks the trailing window for a move beyond the threshold.
    ///
    /// `threshold_pct` is an absolute percentage, e.g. `0.2` for 0.2%.
    #[must_use]
    pub fn detect_move(
        &self,
        symbol: &str,
        leader_name: &str,
        window_ms: i64,
        threshold_pct: f64,
    ) -> Option<MoveEvent> {
        let current = self.current?;
        let move_pct = self.change_over(window_ms)?;

        if move_pct.abs() < threshold_pct {
            return None;
        }

        let cutoff = current.timestamp_ms - window_ms;
        let anchor = self
            .samples
            .iter()
            .find(|s| s.timestamp_ms <= cutoff)
            .or_else(|| self.samples.back())?;

        Some(MoveEvent {
            symbol: symbol.to_string(),
            leader_name: leader_name.to_string(),
            start_price: anchor.price,
            current_price: current.price,
            move_pct,
            direction: if move_pct > 0.0 {
                MoveDirection::Up
            } else {
                MoveDirection::Down
            },
            detected_at_ms: current.timestamp_ms,
        })
    }

    /// Number of samples stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples were recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drops all history.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_empty() {
        let tracker = LeaderTracker::new();
        assert!(tracker.is_empty());
        assert!(tracker.current_price().is_none());
        assert!(tracker.change_over(10_000).is_none());
    }

    #[test]
    fn test_update_and_current() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 1000);
        assert_eq!(tracker.current_price(), Some(100_000.0));
        assert_eq!(tracker.current_timestamp_ms(), Some(1000));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_nonpositive_price_ignored() {
        let mut tracker = LeaderTracker::new();
        tracker.update(0.0, 1000);
        tracker.update(-5.0, 2000);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_change_over_window() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.update(100_300.0, 10_000); // +0.3% over 10s

        let pct = tracker.change_over(10_000).unwrap();
        assert!((pct - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_change_over_negative_move() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.update(99_500.0, 10_000);

        let pct = tracker.change_over(10_000).unwrap();
        assert!((pct + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_change_anchors_at_window_start() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.update(100_200.0, 5_000);
        tracker.update(100_500.0, 10_000);

        // 5s window anchors at the 5_000ms sample.
        let pct = tracker.change_over(5_000).unwrap();
        let expected = (100_500.0 - 100_200.0) / 100_200.0 * 100.0;
        assert!((pct - expected).abs() < 1e-9);

        // 10s window anchors at the origin.
        let pct = tracker.change_over(10_000).unwrap();
        assert!((pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_reports_zero_change() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 1000);
        assert_eq!(tracker.change_over(10_000), Some(0.0));
    }

    #[test]
    fn test_detect_move_threshold() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.update(100_300.0, 10_000);

        // 0.3% move against a 0.2% threshold triggers.
        let event = tracker
            .detect_move("btcusdt", "Bitcoin", 10_000, 0.2)
            .unwrap();
        assert_eq!(event.direction, MoveDirection::Up);
        assert!((event.move_pct - 0.3).abs() < 1e-9);
        assert_eq!(event.symbol, "btcusdt");
        assert_eq!(event.leader_name, "Bitcoin");

        // 0.3% move against a 0.5% threshold does not.
        assert!(tracker
            .detect_move("btcusdt", "Bitcoin", 10_000, 0.5)
            .is_none());
    }

    #[test]
    fn test_detect_move_down() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.update(99_700.0, 10_000);

        let event = tracker
            .detect_move("ethusdt", "Ethereum", 10_000, 0.2)
            .unwrap();
        assert_eq!(event.direction, MoveDirection::Down);
        assert!(event.move_pct < 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = LeaderTracker::new();
        for i in 0..(MAX_HISTORY + 500) {
            tracker.update(100_000.0 + i as f64, i as i64);
        }
        assert_eq!(tracker.len(), MAX_HISTORY);
    }

    #[test]
    fn test_clear() {
        let mut tracker = LeaderTracker::new();
        tracker.update(100_000.0, 0);
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(tracker.current_price().is_none());
    }
}
