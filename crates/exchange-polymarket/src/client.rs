//! REST client for the Gamma catalog and the CLOB API.
//!
//! Three concerns share one rate-limited HTTP client: paginated catalog
//! queries for discovery, one-shot book snapshots used to vet replacement
//! candidates, and order submission for live execution.

use crate::book::L2Book;
use crate::models::RawMarket;
use anyhow::{anyhow, Result};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Catalog page query parameters.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    /// Only active markets.
    pub active: bool,
    /// Exclude closed markets.
    pub closed: bool,
    /// Page size.
    pub limit: usize,
    /// Page offset.
    pub offset: usize,
    /// Optional free-text query.
    pub query: Option<String>,
    /// Optional tag/category filter.
    pub tag_id: Option<String>,
}

impl CatalogQuery {
    /// A volume-sorted page of open markets.
    #[must_use]
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            active: true,
            closed: false,
            limit,
            offset,
            query: None,
            tag_id: None,
        }
    }
}

/// Order submission request.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Outcome token to buy.
    pub token_id: String,
    /// Order side; only buys are used by the strategies.
    pub side: String,
    /// Limit price.
    pub price: Decimal,
    /// Share count.
    pub size: Decimal,
}

/// Order submission response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookSnapshotResponse {
    #[serde(default)]
    bids: Vec<SnapshotLevel>,
    #[serde(default)]
    asks: Vec<SnapshotLevel>,
}

#[derive(Debug, Deserialize)]
struct SnapshotLevel {
    price: String,
    size: String,
}

/// Rate-limited client for the catalog and CLOB REST endpoints.
pub struct VenueClient {
    http: Client,
    catalog_url: String,
    clob_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl VenueClient {
    /// Creates a client with the default 30 requests/minute budget.
    #[must_use]
    pub fn new(catalog_url: impl Into<String>, clob_url: impl Into<String>) -> Self {
        Self::with_rate_limit(catalog_url, clob_url, nonzero!(30u32))
    }

    /// Creates a client with a custom per-minute request budget.
    #[must_use]
    pub fn with_rate_limit(
        catalog_url: impl Into<String>,
        clob_url: impl Into<String>,
        requests_per_minute: NonZeroU32,
    ) -> Self {
        let quota = Quota::per_minute(requests_per_minute);
        Self {
            http: Client::new(),
            catalog_url: catalog_url.into(),
            clob_url: clob_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Returns the catalog base URL.
    #[must_use]
    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    /// Fetches one catalog page, volume-descending.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure or an undecodable body; the caller
    /// aborts the current scan page and retries on the next discovery cycle.
    pub async fn catalog_page(&self, query: &CatalogQuery) -> Result<Vec<RawMarket>> {
        self.rate_limiter.until_ready().await;

        let mut params: Vec<(&str, String)> = vec![
            ("active", query.active.to_string()),
            ("closed", query.closed.to_string()),
            ("order", "volume".to_string()),
            ("ascending", "false".to_string()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(q) = &query.query {
            params.push(("q", q.clone()));
        }
        if let Some(tag) = &query.tag_id {
            params.push(("tag_id", tag.clone()));
        }

        let url = format!("{}/markets", self.catalog_url);
        tracing::debug!(url = %url, offset = query.offset, "Fetching catalog page");

        let response = self
            .http
            .get(&url)
            .query(&params)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("catalog error {status}: {text}"));
        }

        Ok(response.json::<Vec<RawMarket>>().await?)
    }

    /// Fetches a one-shot order book snapshot for a token.
    ///
    /// Used by the watch-set manager to confirm a replacement candidate has
    /// genuine two-sided depth before it is subscribed.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure or an undecodable body.
    pub async fn book_snapshot(&self, token_id: &str) -> Result<L2Book> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/book", self.clob_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("book snapshot error {}", response.status()));
        }

        let body: BookSnapshotResponse = response.json().await?;
        let mut book = L2Book::new(token_id.to_string());
        book.apply_snapshot(parse_levels(&body.bids), parse_levels(&body.asks));
        Ok(book)
    }

    /// Submits an order to the CLOB order endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure; venue-level rejections come back
    /// as `success = false` with a reason.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/order", self.clob_url);
        let response = self.http.post(&url).json(order).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Ok(OrderResponse {
                success: false,
                order_id: None,
                error_msg: Some(format!("{status}: {text}")),
            });
        }

        Ok(response.json::<OrderResponse>().await?)
    }
}

fn parse_levels(levels: &[SnapshotLevel]) -> Vec<(Decimal, Decimal)> {
    levels
        .iter()
        .filter_map(|l| {
            let price = Decimal::from_str(&l.price).ok()?;
            let size = Decimal::from_str(&l.size).ok()?;
            Some((price, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_catalog_page_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("active", "true"))
            .and(query_param("closed", "false"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "m1",
                    "question": "Will BTC exceed $100k?",
                    "outcomes": "[\"Yes\", \"No\"]",
                    "outcomePrices": "[\"0.55\", \"0.45\"]",
                    "clobTokenIds": "[\"t1\", \"t2\"]",
                    "active": true,
                    "closed": false,
                    "liquidity": "5000",
                    "volume": "20000"
                }
            ])))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let page = client.catalog_page(&CatalogQuery::page(100, 0)).await.unwrap();
        assert_eq!(page.len(), 1);
        let market = page[0].to_market().unwrap();
        assert_eq!(market.market_id, "m1");
        assert_eq!(market.combined_price(), dec!(1.00));
    }

    #[tokio::test]
    async fn test_catalog_page_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let result = client.catalog_page(&CatalogQuery::page(100, 0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_book_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book"))
            .and(query_param("token_id", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bids": [{"price": "0.48", "size": "100"}],
                "asks": [{"price": "0.52", "size": "120"}]
            })))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let book = client.book_snapshot("tok-1").await.unwrap();
        assert_eq!(book.best_bid(), Some((dec!(0.48), dec!(100))));
        assert_eq!(book.best_ask(), Some((dec!(0.52), dec!(120))));
        assert!(book.is_two_sided());
    }

    #[tokio::test]
    async fn test_book_snapshot_one_sided() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bids": [],
                "asks": [{"price": "0.52", "size": "120"}]
            })))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let book = client.book_snapshot("tok-1").await.unwrap();
        assert!(!book.is_two_sided());
    }

    #[tokio::test]
    async fn test_place_order_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "orderID": "ord-123"
            })))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let response = client
            .place_order(&OrderRequest {
                token_id: "tok-1".to_string(),
                side: "BUY".to_string(),
                price: dec!(0.48),
                size: dec!(100),
            })
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.order_id.as_deref(), Some("ord-123"));
    }

    #[tokio::test]
    async fn test_place_order_rejection_maps_to_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorMsg": "insufficient balance"
            })))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let response = client
            .place_order(&OrderRequest {
                token_id: "tok-1".to_string(),
                side: "BUY".to_string(),
                price: dec!(0.48),
                size: dec!(100),
            })
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_msg.as_deref(), Some("insufficient balance"));
    }

    #[tokio::test]
    async fn test_place_order_http_error_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = VenueClient::new(server.uri(), server.uri());
        let response = client
            .place_order(&OrderRequest {
                token_id: "tok-1".to_string(),
                side: "BUY".to_string(),
                price: dec!(0.48),
                size: dec!(100),
            })
            .await
            .unwrap();
        assert!(!response.success);
        assert!(response.error_msg.unwrap().contains("503"));
    }
}
