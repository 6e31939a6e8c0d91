//! Binance spot integration: leader price feeds for lag detection.

pub mod feed;
pub mod tracker;

pub use feed::{SpotFeed, SpotFeedConfig, SpotFeedError, SpotFeedSet, SpotFeedStats};
pub use tracker::{LeaderTracker, MoveDirection, MoveEvent, PriceSample};
