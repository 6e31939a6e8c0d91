//! Configuration and shared types for the polyarb trading system.

pub mod config;
pub mod config_loader;

pub use config::{
    AppConfig, DiscoveryConfig, ExecutionConfig, FeedConfig, HealthConfig, IntraConfig, LagConfig,
    Leader, MarketType, OrderDiscipline, WatchConfig,
};
pub use config_loader::ConfigLoader;
