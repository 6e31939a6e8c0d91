//! Gamma catalog data models.
//!
//! The catalog API returns `outcomes`, `outcomePrices`, and `clobTokenIds`
//! as JSON-encoded strings inside the JSON body, so every accessor here
//! parses leniently and returns `Option` instead of trusting the payload.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Raw market entry from the Gamma catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    /// JSON-encoded array of outcome labels, e.g. `"[\"Yes\", \"No\"]"`.
    #[serde(default)]
    pub outcomes: Option<serde_json::Value>,
    /// JSON-encoded array of reference prices, e.g. `"[\"0.60\", \"0.40\"]"`.
    #[serde(default)]
    pub outcome_prices: Option<serde_json::Value>,
    /// JSON-encoded array of outcome token ids.
    #[serde(default)]
    pub clob_token_ids: Option<serde_json::Value>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub liquidity: Option<serde_json::Value>,
    #[serde(default)]
    pub volume: Option<serde_json::Value>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl RawMarket {
    /// Converts the raw catalog entry into a validated [`Market`].
    ///
    /// Returns `None` when any structural requirement fails: a market needs a
    /// question, exactly two outcome labels, exactly two token ids, and two
    /// reference prices.
    #[must_use]
    pub fn to_market(&self) -> Option<Market> {
        let question = self.question.clone()?;
        let outcomes = parse_string_array(self.outcomes.as_ref())?;
        let token_ids = parse_string_array(self.clob_token_ids.as_ref())?;
        let prices = parse_string_array(self.outcome_prices.as_ref())?;

        if outcomes.len() != 2 || token_ids.len() != 2 || prices.len() != 2 {
            return None;
        }

        let price_a = Decimal::from_str(&prices[0]).ok()?;
        let price_b = Decimal::from_str(&prices[1]).ok()?;

        Some(Market {
            market_id: self.id.clone().unwrap_or_else(|| token_ids[0].clone()),
            question,
            token_a: token_ids[0].clone(),
            token_b: token_ids[1].clone(),
            label_a: outcomes[0].clone(),
            label_b: outcomes[1].clone(),
            price_a,
            price_b,
            active: self.active,
            closed: self.closed,
            liquidity: parse_decimal_field(self.liquidity.as_ref()),
            volume: parse_decimal_field(self.volume.as_ref()),
            start_date: parse_date(self.start_date.as_deref()),
            end_date: parse_date(self.end_date.as_deref()),
        })
    }
}

/// A validated binary market: exactly two complementary outcome tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Catalog market id.
    pub market_id: String,
    /// Market question/title.
    pub question: String,
    /// First outcome token id.
    pub token_a: String,
    /// Second outcome token id.
    pub token_b: String,
    /// First outcome label ("Yes", "Up", ...).
    pub label_a: String,
    /// Second outcome label ("No", "Down", ...).
    pub label_b: String,
    /// Reference price of the first outcome from the catalog snapshot.
    /// Used for sanity checks only, never for trading decisions.
    pub price_a: Decimal,
    /// Reference price of the second outcome.
    pub price_b: Decimal,
    /// Whether the market is currently active.
    pub active: bool,
    /// Whether the market has closed.
    pub closed: bool,
    /// Resting liquidity in USDC.
    pub liquidity: Option<Decimal>,
    /// Traded volume in USDC.
    pub volume: Option<Decimal>,
    /// Market start timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Market end/resolution timestamp.
    pub end_date: Option<DateTime<Utc>>,
}

impl Market {
    /// Combined reference price of both outcomes.
    #[must_use]
    pub fn combined_price(&self) -> Decimal {
        self.price_a + self.price_b
    }

    /// Both outcome token ids.
    #[must_use]
    pub fn token_ids(&self) -> [&str; 2] {
        [&self.token_a, &self.token_b]
    }

    /// True when the outcome labels form a recognised binary pair.
    #[must_use]
    pub fn has_binary_labels(&self) -> bool {
        let a = self.label_a.trim().to_lowercase();
        let b = self.label_b.trim().to_lowercase();
        matches!(
            (a.as_str(), b.as_str()),
            ("yes", "no") | ("no", "yes")
                | ("up", "down")
                | ("down", "up")
                | ("true", "false")
                | ("false", "true")
        )
    }

    /// True when the title contains any of the given keywords.
    #[must_use]
    pub fn title_matches(&self, keywords: &[String]) -> bool {
        let title = self.question.to_lowercase();
        keywords.iter().any(|k| title.contains(&k.to_lowercase()))
    }
}

/// Parses a field that arrives either as a JSON array or as a JSON-encoded
/// string containing an array.
fn parse_string_array(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    let value = value?;
    let items: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::String(s) => serde_json::from_str(s).ok()?,
        _ => return None,
    };
    items
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect()
}

/// Parses a numeric field that arrives as a number or a quoted string.
fn parse_decimal_field(value: Option<&serde_json::Value>) -> Option<Decimal> {
    match value? {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
