//! Intra-venue arbitrage detection.
//!
//! A binary market's two outcomes pay out exactly 1.0 between them. When
//! the sum of both best asks drifts below `1 - min_profit_spread`, buying
//! both outcomes locks in the difference. Detection is a stateless scan:
//! read both best asks, size the trade under the liquidity and notional
//! caps, and confirm the profit survives fees and gas.

use polyarb_core::{ExecutionConfig, IntraConfig};
use polyarb_polymarket::{L2Book, Market};
use rust_decimal::{Decimal, RoundingStrategy};

/// A sized, fee-checked intra-venue opportunity.
#[derive(Debug, Clone)]
pub struct IntraOpportunity {
    pub market_id: String,
    pub market_title: String,
    pub token_a: String,
    pub token_b: String,
    pub label_a: String,
    pub label_b: String,
    /// Best ask for the first outcome.
    pub ask_a: Decimal,
    /// Best ask for the second outcome.
    pub ask_b: Decimal,
    /// Combined cost of one unit of both outcomes.
    pub total_cost: Decimal,
    /// Shares bought per leg.
    pub size: Decimal,
    /// Profit before fees: `(1 - total_cost) * size`.
    pub gross_profit: Decimal,
    /// Taker fees across both legs.
    pub taker_fees: Decimal,
    /// Gas across both orders.
    pub gas_cost: Decimal,
    /// Profit after fees and gas.
    pub net_profit: Decimal,
}

/// Stateless intra-venue scanner.
#[derive(Debug, Clone)]
pub struct IntraScanner {
    config: IntraConfig,
    gas_per_order: Decimal,
}

impl IntraScanner {
    /// Creates a scanner from the strategy and execution sections.
    #[must_use]
    pub fn new(config: IntraConfig, execution: &ExecutionConfig) -> Self {
        Self {
            gas_per_order: execution.gas_per_order(),
            config,
        }
    }

    /// Threshold the combined ask cost must stay under.
    #[must_use]
    pub fn cost_threshold(&self) -> Decimal {
        Decimal::ONE - self.config.min_profit_spread
    }

    /// Evaluates one market. Returns an opportunity only when every gate
    /// passes: both asks present, spread wide enough, size viable, and net
    /// profit per unit above the configured floor.
    #[must_use]
    pub fn evaluate(
        &self,
        market: &Market,
        book_a: &L2Book,
        book_b: &L2Book,
    ) -> Option<IntraOpportunity> {
        let (ask_a, size_a) = book_a.best_ask()?;
        let (ask_b, size_b) = book_b.best_ask()?;

        let total_cost = ask_a + ask_b;
        if total_cost >= self.cost_threshold() {
            return None;
        }

        let notional_cap = self.config.max_notional / total_cost;
        let size = size_a
            .min(size_b)
            .min(notional_cap)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if size < self.config.min_viable_size {
            return None;
        }

        let gross_profit = (Decimal::ONE - total_cost) * size;
        let taker_fees = self.config.market_type.taker_fee_rate() * total_cost * size;
        let gas_cost = self.gas_per_order * Decimal::TWO;
        let net_profit = gross_profit - taker_fees - gas_cost;

        if net_profit / size < self.config.min_net_spread {
            return None;
        }

        Some(IntraOpportunity {
            market_id: market.market_id.clone(),
            market_title: market.question.clone(),
            token_a: market.token_a.clone(),
            token_b: market.token_b.clone(),
            label_a: market.label_a.clone(),
            label_b: market.label_b.clone(),
            ask_a,
            ask_b,
            total_cost,
            size,
            gross_profit,
            taker_fees,
            gas_cost,
            net_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyarb_core::MarketType;
    use polyarb_polymarket::Side;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            market_id: "m1".to_string(),
            question: "Will BTC exceed $100k?".to_string(),
            token_a: "t1".to_string(),
            token_b: "t2".to_string(),
            label_a: "Yes".to_string(),
            label_b: "No".to_string(),
            price_a: dec!(0.5),
            price_b: dec!(0.5),
            active: true,
            closed: false,
            liquidity: Some(dec!(5000)),
            volume: Some(dec!(10000)),
            start_date: None,
            end_date: None,
        }
    }

    fn book(token: &str, ask: Decimal, size: Decimal) -> L2Book {
        let mut book = L2Book::new(token.to_string());
        book.apply_level(Side::Sell, ask, size);
        book
    }

    fn scanner(config: IntraConfig, execution: &ExecutionConfig) -> IntraScanner {
        IntraScanner::new(config, execution)
    }

    #[test]
    fn test_spec_example_accepted() {
        // askA=0.40, askB=0.55, sizes 1000, maxNotional=100, spread 0.01.
        let config = IntraConfig {
            min_profit_spread: dec!(0.01),
            max_notional: dec!(100),
            ..Default::default()
        };
        let execution = ExecutionConfig {
            gasless: true,
            ..Default::default()
        };
        let scanner = scanner(config, &execution);

        let opp = scanner
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(1000)),
                &book("t2", dec!(0.55), dec!(1000)),
            )
            .expect("opportunity");

        assert_eq!(opp.total_cost, dec!(0.95));
        // 100 / 0.95 = 105.263..., floored to two decimals.
        assert_eq!(opp.size, dec!(105.26));
        assert_eq!(opp.gross_profit, dec!(0.05) * dec!(105.26));
        assert_eq!(opp.net_profit, opp.gross_profit);
    }

    #[test]
    fn test_missing_ask_skips_market() {
        let scanner = scanner(IntraConfig::default(), &ExecutionConfig::default());
        let empty = L2Book::new("t2".to_string());
        assert!(scanner
            .evaluate(&market(), &book("t1", dec!(0.40), dec!(100)), &empty)
            .is_none());
    }

    #[test]
    fn test_cost_at_threshold_rejected() {
        let config = IntraConfig {
            min_profit_spread: dec!(0.01),
            ..Default::default()
        };
        let scanner = scanner(config, &ExecutionConfig::default());
        // 0.44 + 0.55 = 0.99 = threshold exactly; not strictly below.
        assert!(scanner
            .evaluate(
                &market(),
                &book("t1", dec!(0.44), dec!(100)),
                &book("t2", dec!(0.55), dec!(100)),
            )
            .is_none());
    }

    #[test]
    fn test_size_limited_by_liquidity() {
        let config = IntraConfig {
            max_notional: dec!(100000),
            ..Default::default()
        };
        let scanner = scanner(config, &ExecutionConfig::default());
        let opp = scanner
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(30)),
                &book("t2", dec!(0.50), dec!(80)),
            )
            .unwrap();
        assert_eq!(opp.size, dec!(30));
    }

    #[test]
    fn test_below_min_viable_size_rejected() {
        let scanner = scanner(IntraConfig::default(), &ExecutionConfig::default());
        assert!(scanner
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(1.5)),
                &book("t2", dec!(0.50), dec!(1000)),
            )
            .is_none());
    }

    #[test]
    fn test_net_profit_gate_rejects_thin_spread() {
        // Spread clears the gross gate but gas eats the profit.
        let config = IntraConfig {
            min_profit_spread: dec!(0.005),
            min_net_spread: dec!(0.002),
            max_notional: dec!(5),
            ..Default::default()
        };
        let execution = ExecutionConfig {
            gas_cost_per_order: dec!(0.05),
            ..Default::default()
        };
        let scanner = scanner(config, &execution);

        // total 0.985; size = 5/0.985 = 5.07; gross = 0.076; gas = 0.10.
        assert!(scanner
            .evaluate(
                &market(),
                &book("t1", dec!(0.49), dec!(1000)),
                &book("t2", dec!(0.495), dec!(1000)),
            )
            .is_none());
    }

    #[test]
    fn test_us_taker_fee_reduces_net() {
        let config_free = IntraConfig {
            market_type: MarketType::Standard,
            ..Default::default()
        };
        let config_us = IntraConfig {
            market_type: MarketType::Us,
            ..Default::default()
        };
        let execution = ExecutionConfig {
            gasless: true,
            ..Default::default()
        };

        let free = scanner(config_free, &execution)
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(1000)),
                &book("t2", dec!(0.50), dec!(1000)),
            )
            .unwrap();
        let us = scanner(config_us, &execution)
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(1000)),
                &book("t2", dec!(0.50), dec!(1000)),
            )
            .unwrap();

        assert_eq!(free.taker_fees, Decimal::ZERO);
        assert!(us.taker_fees > Decimal::ZERO);
        assert!(us.net_profit < free.net_profit);
    }

    #[test]
    fn test_gasless_removes_gas_cost() {
        let execution = ExecutionConfig {
            gasless: true,
            ..Default::default()
        };
        let opp = scanner(IntraConfig::default(), &execution)
            .evaluate(
                &market(),
                &book("t1", dec!(0.40), dec!(1000)),
                &book("t2", dec!(0.50), dec!(1000)),
            )
            .unwrap();
        assert_eq!(opp.gas_cost, Decimal::ZERO);
    }
}
