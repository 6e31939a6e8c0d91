//! Market-question parsing for the lag strategy.
//!
//! Turns a market question into structured strike/direction data. Parsers
//! form a ranked chain behind one interface: the regex tier runs first and
//! handles the common phrasings; anything slower (an external model, a
//! remote service) slots in behind it and is only consulted when the cheap
//! tier returns nothing. The system must keep functioning with the regex
//! tier alone.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Price target extracted from a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A concrete strike price.
    Price(Decimal),
    /// The question is about the price at resolution relative to now
    /// ("up or down" markets).
    CurrentPrice,
}

/// Direction extracted from a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
    Range,
}

/// Structured result of parsing a market question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    /// Asset ticker, e.g. `BTC`.
    pub asset: String,
    /// Strike or current-price marker.
    pub target: Target,
    /// Which side of the strike the question asks about.
    pub direction: Direction,
}

/// One tier in the parser chain.
pub trait QuestionParser: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Best-effort parse; `None` means "not my kind of question".
    fn parse(&self, question: &str) -> Option<ParsedQuestion>;
}

/// Pattern-matching tier. Handles asset detection, up/down phrasing,
/// ranges, strict and loose comparator patterns, and a guarded generic
/// number fallback.
pub struct RegexParser {
    range: Regex,
    strict_bull: Regex,
    strict_bear: Regex,
    loose_bull: Regex,
    loose_bear: Regex,
    generic_number: Regex,
}

impl Default for RegexParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexParser {
    /// Compiles the pattern set.
    #[must_use]
    pub fn new() -> Self {
        let assets = r"(?:btc|bitcoin|eth|ethereum|sol|solana)";
        let bull = r"(?:above|greater|more|exceed|hit|touch|reach)";
        let bear = r"(?:below|under|less|smaller)";
        Self {
            range: Regex::new(r"between\s+\$?([\d,.]+)(k)?\s+and\s+\$?([\d,.]+)(k)?").unwrap(),
            strict_bull: Regex::new(&format!(
                r"{assets}\s+(?:is\s+)?{bull}\s+\$?([\d,.]+)(k)?"
            ))
            .unwrap(),
            strict_bear: Regex::new(&format!(
                r"{assets}\s+(?:is\s+)?{bear}\s+\$?([\d,.]+)(k)?"
            ))
            .unwrap(),
            loose_bull: Regex::new(&format!(r"{bull}.*?\$?([\d,.]+)(k)?")).unwrap(),
            loose_bear: Regex::new(&format!(r"{bear}.*?\$?([\d,.]+)(k)?")).unwrap(),
            generic_number: Regex::new(r"\$?(\d{1,3}(?:,\d{3})*(?:\.\d+)?|\d+)(k)?").unwrap(),
        }
    }

    fn detect_asset(question: &str) -> Option<&'static str> {
        if question.contains("bitcoin") || question.contains("btc") {
            Some("BTC")
        } else if question.contains("ethereum") || question.contains("eth") {
            Some("ETH")
        } else if question.contains("solana") || question.contains("sol") {
            Some("SOL")
        } else {
            None
        }
    }

    fn parse_value(value: &str, suffix: Option<&str>) -> Option<Decimal> {
        let clean: String = value.chars().filter(|c| *c != ',' && *c != '$').collect();
        let mut parsed = Decimal::from_str(&clean).ok()?;
        if matches!(suffix, Some(s) if s.eq_ignore_ascii_case("k")) {
            parsed *= Decimal::new(1000, 0);
        }
        Some(parsed)
    }

    fn capture_value(caps: &regex::Captures<'_>, value_idx: usize) -> Option<Decimal> {
        let value = caps.get(value_idx)?.as_str();
        let suffix = caps.get(value_idx + 1).map(|m| m.as_str());
        Self::parse_value(value, suffix)
    }
}

impl QuestionParser for RegexParser {
    fn name(&self) -> &str {
        "regex"
    }

    fn parse(&self, question: &str) -> Option<ParsedQuestion> {
        let q = question.to_lowercase();

        let asset = Self::detect_asset(&q)?.to_string();

        // All-time-high/low questions have no fixed strike.
        if q.contains("all time high") || q.contains("all time low") {
            return None;
        }

        // "Up or down" markets resolve against the current price.
        if q.contains("down") || q.contains("up") {
            return Some(ParsedQuestion {
                asset,
                target: Target::CurrentPrice,
                direction: Direction::Above,
            });
        }

        // "Between X and Y" ranges use the midpoint as the strike.
        if let Some(caps) = self.range.captures(&q) {
            let low = Self::capture_value(&caps, 1);
            let high = Self::capture_value(&caps, 3);
            if let (Some(low), Some(high)) = (low, high) {
                return Some(ParsedQuestion {
                    asset,
                    target: Target::Price((low + high) / Decimal::TWO),
                    direction: Direction::Range,
                });
            }
        }

        // Strict asset+comparator patterns are the most precise, so they
        // run before the loose keyword search.
        if let Some(caps) = self.strict_bull.captures(&q) {
            if let Some(value) = Self::capture_value(&caps, 1) {
                return Some(ParsedQuestion {
                    asset,
                    target: Target::Price(value),
                    direction: Direction::Above,
                });
            }
        }
        if let Some(caps) = self.strict_bear.captures(&q) {
            if let Some(value) = Self::capture_value(&caps, 1) {
                return Some(ParsedQuestion {
                    asset,
                    target: Target::Price(value),
                    direction: Direction::Below,
                });
            }
        }

        // Loose comparator patterns: keyword anywhere, number afterwards.
        if let Some(caps) = self.loose_bear.captures(&q) {
            if let Some(value) = Self::capture_value(&caps, 1) {
                return Some(ParsedQuestion {
                    asset,
                    target: Target::Price(value),
                    direction: Direction::Below,
                });
            }
        }
        if let Some(caps) = self.loose_bull.captures(&q) {
            if let Some(value) = Self::capture_value(&caps, 1) {
                return Some(ParsedQuestion {
                    asset,
                    target: Target::Price(value),
                    direction: Direction::Above,
                });
            }
        }

        // Generic number fallback. Years and calendar days masquerade as
        // prices, so filter small unsuffixed values.
        let mut candidates = Vec::new();
        for caps in self.generic_number.captures_iter(&q) {
            let suffix = caps.get(2).map(|m| m.as_str());
            let Some(value) = Self::capture_value(&caps, 1) else {
                continue;
            };
            let unsuffixed = suffix.is_none();
            if unsuffixed && value > Decimal::new(2020, 0) && value < Decimal::new(2030, 0) {
                continue;
            }
            if unsuffixed && value <= Decimal::new(31, 0) {
                continue;
            }
            candidates.push(value);
        }

        if candidates.len() == 1 {
            return Some(ParsedQuestion {
                asset,
                target: Target::Price(candidates[0]),
                direction: Direction::Above,
            });
        }

        None
    }
}

/// Ranked chain of parser tiers with a soft per-tier time budget.
pub struct ParserChain {
    tiers: Vec<Box<dyn QuestionParser>>,
    tier_budget: Duration,
}

impl ParserChain {
    /// A chain with only the regex tier.
    #[must_use]
    pub fn regex_only() -> Self {
        Self {
            tiers: vec![Box::new(RegexParser::new())],
            tier_budget: Duration::from_millis(250),
        }
    }

    /// Appends a slower tier behind the existing ones.
    #[must_use]
    pub fn with_tier(mut self, tier: Box<dyn QuestionParser>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Sets the per-tier time budget.
    #[must_use]
    pub fn with_tier_budget(mut self, budget: Duration) -> Self {
        self.tier_budget = budget;
        self
    }

    /// Tries each tier in order until one returns a result.
    #[must_use]
    pub fn parse(&self, question: &str) -> Option<ParsedQuestion> {
        for tier in &self.tiers {
            let started = Instant::now();
            let result = tier.parse(question);
            let elapsed = started.elapsed();
            if elapsed > self.tier_budget {
                warn!(tier = tier.name(), ?elapsed, "Parser tier exceeded its budget");
            }
            if let Some(parsed) = result {
                debug!(tier = tier.name(), question, "Parsed question");
                return Some(parsed);
            }
        }
        None
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::regex_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(question: &str) -> Option<ParsedQuestion> {
        RegexParser::new().parse(question)
    }

    #[test]
    fn test_no_asset_returns_none() {
        assert!(parse("Will it rain above 5 inches tomorrow?").is_none());
    }

    #[test]
    fn test_all_time_high_rejected() {
        assert!(parse("Will Bitcoin reach an all time high this year?").is_none());
    }

    #[test]
    fn test_up_or_down_is_current_price() {
        let parsed = parse("Bitcoin Up or Down - March 7, 3PM ET").unwrap();
        assert_eq!(parsed.asset, "BTC");
        assert_eq!(parsed.target, Target::CurrentPrice);
        assert_eq!(parsed.direction, Direction::Above);
    }

    #[test]
    fn test_between_range_uses_midpoint() {
        let parsed = parse("Will Ethereum be between $3,000 and $4,000 on Friday?").unwrap();
        assert_eq!(parsed.asset, "ETH");
        assert_eq!(parsed.target, Target::Price(dec!(3500)));
        assert_eq!(parsed.direction, Direction::Range);
    }

    #[test]
    fn test_strict_bullish_pattern() {
        let parsed = parse("Will Bitcoin exceed $95,000 this week?").unwrap();
        assert_eq!(parsed.asset, "BTC");
        assert_eq!(parsed.target, Target::Price(dec!(95000)));
        assert_eq!(parsed.direction, Direction::Above);
    }

    #[test]
    fn test_strict_bearish_pattern() {
        let parsed = parse("Will BTC is below 90,000 at expiry?").unwrap();
        assert_eq!(parsed.target, Target::Price(dec!(90000)));
        assert_eq!(parsed.direction, Direction::Below);
    }

    #[test]
    fn test_k_suffix_multiplies() {
        let parsed = parse("Will Bitcoin hit 100k?").unwrap();
        assert_eq!(parsed.target, Target::Price(dec!(100000)));
        assert_eq!(parsed.direction, Direction::Above);
    }

    #[test]
    fn test_loose_bearish_pattern() {
        let parsed = parse("Solana trading under $150 by Sunday?").unwrap();
        assert_eq!(parsed.asset, "SOL");
        assert_eq!(parsed.target, Target::Price(dec!(150)));
        assert_eq!(parsed.direction, Direction::Below);
    }

    #[test]
    fn test_generic_number_fallback() {
        let parsed = parse("Bitcoin $100,000?").unwrap();
        assert_eq!(parsed.target, Target::Price(dec!(100000)));
        assert_eq!(parsed.direction, Direction::Above);
    }

    #[test]
    fn test_year_filtered_from_generic_fallback() {
        // 2026 would otherwise read as a strike.
        assert!(parse("Bitcoin in 2026?").is_none());
    }

    #[test]
    fn test_calendar_day_filtered() {
        assert!(parse("Bitcoin on January 17?").is_none());
    }

    #[test]
    fn test_chain_tries_tiers_in_order() {
        struct Fallback;
        impl QuestionParser for Fallback {
            fn name(&self) -> &str {
                "fallback"
            }
            fn parse(&self, _question: &str) -> Option<ParsedQuestion> {
                Some(ParsedQuestion {
                    asset: "BTC".to_string(),
                    target: Target::Price(dec!(1)),
                    direction: Direction::Above,
                })
            }
        }

        let chain = ParserChain::regex_only().with_tier(Box::new(Fallback));

        // Regex tier wins when it matches.
        let parsed = chain.parse("Will Bitcoin exceed $95,000?").unwrap();
        assert_eq!(parsed.target, Target::Price(dec!(95000)));

        // Fallback answers what regex cannot.
        let parsed = chain.parse("Strange market wording").unwrap();
        assert_eq!(parsed.target, Target::Price(dec!(1)));
    }

    #[test]
    fn test_chain_none_when_all_tiers_fail() {
        let chain = ParserChain::regex_only();
        assert!(chain.parse("nothing parseable here").is_none());
    }
}
