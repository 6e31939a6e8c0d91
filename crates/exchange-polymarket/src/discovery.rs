//! Market discovery: catalog scan, candidate validation, quality scoring.
//!
//! Scans the catalog in volume-descending pages until the scan budget is
//! exhausted, rejects structurally unsound candidates, and scores the
//! survivors 0-100. The caller takes the top K as the live watch set and
//! keeps the remainder as the candidate pool.

use crate::client::{CatalogQuery, VenueClient};
use crate::models::Market;
use chrono::{DateTime, Utc};
use polyarb_core::DiscoveryConfig;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Why a candidate was rejected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Inactive or already closed.
    NotTradeable,
    /// Liquidity below the configured floor.
    LowLiquidity,
    /// Volume below the configured floor.
    LowVolume,
    /// End date missing, past, or closer than the minimum horizon.
    BadHorizon,
    /// Combined reference price outside the sanity band.
    PriceOutOfBand,
}

/// A validated candidate with its quality score.
#[derive(Debug, Clone)]
pub struct ScoredMarket {
    pub market: Market,
    /// Quality score in [0, 100].
    pub score: Decimal,
}

/// Validates a candidate against the discovery rules.
///
/// # Errors
///
/// Returns the first [`RejectReason`] that applies. Outcome/token count
/// violations never reach this point: [`crate::models::RawMarket::to_market`]
/// already refuses to build such a [`Market`].
pub fn validate(
    market: &Market,
    now: DateTime<Utc>,
    config: &DiscoveryConfig,
) -> Result<(), RejectReason> {
    if !market.active || market.closed {
        return Err(RejectReason::NotTradeable);
    }

    let liquidity = market.liquidity.unwrap_or(Decimal::ZERO);
    if liquidity < config.min_liquidity {
        return Err(RejectReason::LowLiquidity);
    }

    match market.end_date {
        Some(end) => {
            let horizon = chrono::Duration::hours(config.min_horizon_hours);
            if end <= now + horizon {
                return Err(RejectReason::BadHorizon);
            }
        }
        None => return Err(RejectReason::BadHorizon),
    }

    let combined = market.combined_price();
    if combined < Decimal::new(90, 2) || combined > Decimal::new(110, 2) {
        return Err(RejectReason::PriceOutOfBand);
    }

    let volume = market.volume.unwrap_or(Decimal::ZERO);
    if volume < config.min_volume {
        return Err(RejectReason::LowVolume);
    }

    Ok(())
}

/// Scores a validated candidate 0-100.
///
/// Components: liquidity 0-40 (linear to the cap), volume 0-30 (linear to
/// the cap), price efficiency 0-20 (four bands on |1 - pA - pB|), and
/// time-to-expiry fit 0-10 (best inside a 1-7 day window).
#[must_use]
pub fn score(market: &Market, now: DateTime<Utc>, config: &DiscoveryConfig) -> Decimal {
    let liquidity = market.liquidity.unwrap_or(Decimal::ZERO);
    let liquidity_score =
        Decimal::new(40, 0) * (liquidity / config.liquidity_cap).min(Decimal::ONE);

    let volume = market.volume.unwrap_or(Decimal::ZERO);
    let volume_score = Decimal::new(30, 0) * (volume / config.volume_cap).min(Decimal::ONE);

    let inefficiency = (Decimal::ONE - market.combined_price()).abs();
    let efficiency_score = if inefficiency < Decimal::new(1, 2) {
        Decimal::new(20, 0)
    } else if inefficiency < Decimal::new(3, 2) {
        Decimal::new(12, 0)
    } else if inefficiency < Decimal::new(5, 2) {
        Decimal::new(6, 0)
    } else {
        Decimal::ZERO
    };

    let expiry_score = match market.end_date {
        Some(end) => {
            let hours = (end - now).num_hours();
            if (24..=24 * 7).contains(&hours) {
                Decimal::new(10, 0)
            } else if hours > 24 * 7 && hours <= 24 * 30 {
                Decimal::new(6, 0)
            } else if hours < 24 {
                Decimal::new(4, 0)
            } else {
                Decimal::new(2, 0)
            }
        }
        None => Decimal::ZERO,
    };

    liquidity_score + volume_score + efficiency_score + expiry_score
}

/// Scans the catalog and returns all surviving candidates, best first.
pub async fn scan(client: &VenueClient, config: &DiscoveryConfig) -> Vec<ScoredMarket> {
    let now = Utc::now();
    let mut scored: Vec<ScoredMarket> = Vec::new();
    let mut examined = 0usize;
    let mut offset = 0usize;

    while examined < config.scan_budget {
        let query = CatalogQuery::page(config.page_size, offset);
        let page = match client.catalog_page(&query).await {
            Ok(page) => page,
            Err(e) => {
                // Abort this scan; the next discovery cycle retries.
                warn!(error = %e, offset, "Catalog page failed, aborting scan");
                break;
            }
        };

        let page_len = page.len();
        examined += page_len;
        offset += page_len;

        for raw in page {
            let Some(market) = raw.to_market() else {
                continue;
            };
            match validate(&market, now, config) {
                Ok(()) => {
                    let market_score = score(&market, now, config);
                    scored.push(ScoredMarket {
                        market,
                        score: market_score,
                    });
                }
                Err(reason) => {
                    debug!(question = %market.question, ?reason, "Rejected candidate");
                }
            }
        }

        if page_len < config.page_size {
            break;
        }
    }

    scored.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            b.market
                .liquidity
                .unwrap_or(Decimal::ZERO)
                .cmp(&a.market.liquidity.unwrap_or(Decimal::ZERO))
        })
    });

    info!(
        examined,
        candidates = scored.len(),
        "Discovery scan complete"
    );

    scored
}
