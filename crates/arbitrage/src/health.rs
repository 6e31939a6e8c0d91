//! Feed staleness monitoring.
//!
//! Each feed calls [`HealthMonitor::mark`] on every inbound message; a
//! periodic reporter logs which feeds have gone quiet past the threshold.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Health verdict for one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedHealth {
    /// Updated within the staleness threshold; age in seconds.
    Ok(i64),
    /// No update for longer than the threshold; age in seconds.
    Stale(i64),
    /// Never updated.
    NoData,
}

/// Tracks last-update timestamps per feed.
#[derive(Clone)]
pub struct HealthMonitor {
    last_update: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    stale_after: Duration,
}

impl HealthMonitor {
    /// Creates a monitor with the given staleness threshold.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_update: Arc::new(RwLock::new(HashMap::new())),
            stale_after,
        }
    }

    /// Records an update for the named feed.
    pub fn mark(&self, feed: &str) {
        self.last_update
            .write()
            .insert(feed.to_string(), Utc::now());
    }

    /// Returns the current health of the named feed.
    #[must_use]
    pub fn status(&self, feed: &str) -> FeedHealth {
        match self.last_update.read().get(feed) {
            None => FeedHealth::NoData,
            Some(last) => {
                let age = (Utc::now() - *last).num_seconds();
                if age <= self.stale_after.as_secs() as i64 {
                    FeedHealth::Ok(age)
                } else {
                    FeedHealth::Stale(age)
                }
            }
        }
    }

    /// Returns every tracked feed with its health.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, FeedHealth)> {
        let feeds: Vec<String> = self.last_update.read().keys().cloned().collect();
        feeds
            .into_iter()
            .map(|feed| {
                let status = self.status(&feed);
                (feed, status)
            })
            .collect()
    }

    /// Logs one health report line per feed.
    pub fn report(&self) {
        for (feed, status) in self.snapshot() {
            match status {
                FeedHealth::Ok(age) => {
                    info!(feed = %feed, age_secs = age, "Feed healthy");
                }
                FeedHealth::Stale(age) => {
                    warn!(feed = %feed, age_secs = age, "Feed stale");
                }
                FeedHealth::NoData => {
                    warn!(feed = %feed, "Feed has no updates yet");
                }
            }
        }
    }

    /// Spawns a task logging a report on the given interval.
    #[must_use]
    pub fn spawn_reporter(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.report();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_feed_is_no_data() {
        let monitor = HealthMonitor::new(Duration::from_secs(50));
        assert_eq!(monitor.status("polymarket"), FeedHealth::NoData);
    }

    #[test]
    fn test_marked_feed_is_ok() {
        let monitor = HealthMonitor::new(Duration::from_secs(50));
        monitor.mark("polymarket");
        assert!(matches!(monitor.status("polymarket"), FeedHealth::Ok(_)));
    }

    #[test]
    fn test_zero_threshold_goes_stale() {
        let monitor = HealthMonitor::new(Duration::from_secs(0));
        monitor.mark("binance");
        std::thread::sleep(Duration::from_millis(1100));
        assert!(matches!(monitor.status("binance"), FeedHealth::Stale(_)));
    }

    #[test]
    fn test_snapshot_lists_all_feeds() {
        let monitor = HealthMonitor::new(Duration::from_secs(50));
        monitor.mark("polymarket");
        monitor.mark("binance");
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
