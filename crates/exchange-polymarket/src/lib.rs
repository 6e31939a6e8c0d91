//! Polymarket CLOB integration for the polyarb trading system.
//!
//! This crate provides:
//! - In-memory L2 order books rebuilt from snapshot and delta messages
//! - A WebSocket market stream with dynamic subscriptions
//! - A rate-limited REST client for the catalog, book snapshots, and orders
//! - Market discovery with candidate validation and quality scoring

pub mod book;
pub mod client;
pub mod discovery;
pub mod models;
pub mod websocket;

pub use book::{L2Book, Side};
pub use client::{CatalogQuery, OrderRequest, OrderResponse, VenueClient};
pub use discovery::{scan, score, validate, RejectReason, ScoredMarket};
pub use models::{Market, RawMarket};
pub use websocket::{BookEvent, MarketStream, StreamConfig, StreamError};
