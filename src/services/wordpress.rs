use crate::core::repository::{ListingRepository, RepositoryError};
use crate::models::{ExchangeType, Listing, ListingId, OwnerId, OwnerStats};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the WordPress REST API
#[derive(Debug, Error)]
pub enum WordPressError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid application password")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Requested page is past the last page")]
    PageOutOfRange,
}

impl From<WordPressError> for RepositoryError {
    fn from(err: WordPressError) -> Self {
        match err {
            WordPressError::InvalidResponse(msg) => RepositoryError::InvalidResponse(msg),
            other => RepositoryError::Upstream(other.to_string()),
        }
    }
}

/// Client for the exchange plugin's REST namespace
///
/// Handles all communication with the WordPress side including:
/// - Fetching single listings
/// - Paging through active listings of given exchange types
/// - Fetching owner exchange statistics
pub struct WordPressListingClient {
    base_url: String,
    username: String,
    application_password: String,
    page_size: usize,
    client: Client,
}

impl WordPressListingClient {
    /// Create a new WordPress client
    pub fn new(
        base_url: String,
        username: String,
        application_password: String,
        page_size: usize,
        timeout_secs: u64,
    ) -> Result<Self, WordPressError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            username,
            application_password,
            page_size: page_size.clamp(1, 100),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn get_json(&self, url: &str) -> Result<Option<Value>, WordPressError> {
        Ok(self.get_response(url).await?.map(|(doc, _)| doc))
    }

    /// GET a document together with the `X-WP-TotalPages` header when present
    async fn get_response(
        &self,
        url: &str,
    ) -> Result<Option<(Value, Option<usize>)>, WordPressError> {
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.application_password))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(WordPressError::Unauthorized)
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("rest_post_invalid_page_number") {
                    return Err(WordPressError::PageOutOfRange);
                }
                tracing::error!("WordPress request {} failed: 400 - {}", url, body);
                return Err(WordPressError::ApiError(format!(
                    "{} returned {}",
                    url,
                    StatusCode::BAD_REQUEST
                )));
            }
            status if !status.is_success() => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read body".to_string());
                tracing::error!("WordPress request {} failed: {} - {}", url, status, body);
                return Err(WordPressError::ApiError(format!("{} returned {}", url, status)));
            }
            _ => {}
        }

        let total_pages = response
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        Ok(Some((response.json().await?, total_pages)))
    }

    /// Fetch a single listing by post id
    pub async fn fetch_listing(&self, id: ListingId) -> Result<Listing, WordPressError> {
        let url = self.url(&format!("listings/{}", id));
        let doc = self
            .get_json(&url)
            .await?
            .ok_or_else(|| WordPressError::NotFound(format!("listing {}", id)))?;

        Listing::from_document(&doc).ok_or_else(|| {
            WordPressError::InvalidResponse(format!("listing {} is missing required fields", id))
        })
    }

    /// Page through active listings of the given exchange types
    pub async fn fetch_active_listings(
        &self,
        types: &[ExchangeType],
    ) -> Result<Vec<Listing>, WordPressError> {
        let type_filter = types
            .iter()
            .map(ExchangeType::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut listings = Vec::new();
        let mut skipped = 0usize;
        let mut page = 1usize;

        loop {
            let url = self.url(&format!(
                "listings?status=active&exchange_type={}&per_page={}&page={}",
                urlencoding::encode(&type_filter),
                self.page_size,
                page
            ));

            let (documents, total_pages) = match self.get_response(&url).await {
                Ok(Some((Value::Array(docs), total_pages))) => (docs, total_pages),
                Ok(Some(_)) => {
                    return Err(WordPressError::InvalidResponse(
                        "Expected an array of listings".into(),
                    ))
                }
                Ok(None) => break,
                // Past-the-end pages come back as 400 rest_post_invalid_page_number
                Err(WordPressError::PageOutOfRange) if page > 1 => break,
                Err(e) => return Err(e),
            };

            let count = documents.len();
            for doc in &documents {
                match Listing::from_document(doc) {
                    Some(listing) => listings.push(listing),
                    None => skipped += 1,
                }
            }

            if count < self.page_size || total_pages.is_some_and(|total| page >= total) {
                break;
            }
            page += 1;
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed listings from WordPress", skipped);
        }
        tracing::debug!("Fetched {} active listings ({})", listings.len(), type_filter);

        Ok(listings)
    }

    /// Fetch owner exchange statistics, `None` when the owner has no history
    pub async fn fetch_owner_stats(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<OwnerStats>, WordPressError> {
        let url = self.url(&format!("users/{}/exchange-stats", owner_id));
        let Some(doc) = self.get_json(&url).await? else {
            return Ok(None);
        };

        serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| {
                WordPressError::InvalidResponse(format!("Failed to parse owner stats: {}", e))
            })
    }
}

impl ListingRepository for WordPressListingClient {
    async fn get_listing(&self, id: ListingId) -> Result<Listing, RepositoryError> {
        self.fetch_listing(id).await.map_err(|e| match e {
            WordPressError::NotFound(_) => RepositoryError::NotFound(id),
            other => other.into(),
        })
    }

    async fn active_listings(
        &self,
        types: &[ExchangeType],
    ) -> Result<Vec<Listing>, RepositoryError> {
        Ok(self.fetch_active_listings(types).await?)
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> Result<Option<OwnerStats>, RepositoryError> {
        Ok(self.fetch_owner_stats(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: String, page_size: usize) -> WordPressListingClient {
        WordPressListingClient::new(
            base_url,
            "matcher".to_string(),
            "app pass".to_string(),
            page_size,
            5,
        )
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = client("https://example.org/wp-json/exchange/v1/".to_string(), 50);
        assert_eq!(
            client.url("/listings/7"),
            "https://example.org/wp-json/exchange/v1/listings/7"
        );
    }

    #[tokio::test]
    async fn test_fetch_listing_parses_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/listings/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":42,"author":7,"title":{"rendered":"Bike"},
                    "meta":{"exchange_type":"give","category":"sports/cycling",
                            "latitude":"52.52","longitude":"13.40","condition":"good"}}"#,
            )
            .create_async()
            .await;

        let listing = client(server.url(), 50).get_listing(42).await.unwrap();
        mock.assert_async().await;

        assert_eq!(listing.id, 42);
        assert_eq!(listing.owner_id, 7);
        assert_eq!(listing.exchange_type, ExchangeType::Give);
        assert!(listing.coordinates.is_some());
    }

    #[tokio::test]
    async fn test_missing_listing_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/listings/5")
            .with_status(404)
            .create_async()
            .await;

        let result = client(server.url(), 50).get_listing(5).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(5))));
    }

    #[tokio::test]
    async fn test_active_listings_pages_and_skips_malformed() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":1,"owner_id":10,"exchange_type":"request"},
                    {"id":2,"owner_id":11,"exchange_type":"nonsense"}]"#,
            )
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":3,"owner_id":12,"exchange_type":"swap"}]"#)
            .create_async()
            .await;

        let listings = client(server.url(), 2)
            .active_listings(&[ExchangeType::Request, ExchangeType::Swap])
            .await
            .unwrap();
        page1.assert_async().await;
        page2.assert_async().await;

        let ids: Vec<u64> = listings.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_full_last_page_ends_on_invalid_page_number() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":1,"owner_id":10,"exchange_type":"request"},
                    {"id":2,"owner_id":11,"exchange_type":"swap"}]"#,
            )
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":"rest_post_invalid_page_number",
                    "message":"The page number requested is larger than available.",
                    "data":{"status":400}}"#,
            )
            .create_async()
            .await;

        let listings = client(server.url(), 2)
            .active_listings(&[ExchangeType::Request, ExchangeType::Swap])
            .await
            .unwrap();
        page1.assert_async().await;
        page2.assert_async().await;

        assert_eq!(listings.len(), 2);
    }

    #[tokio::test]
    async fn test_total_pages_header_stops_paging() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("X-WP-TotalPages", "1")
            .with_body(
                r#"[{"id":1,"owner_id":10,"exchange_type":"request"},
                    {"id":2,"owner_id":11,"exchange_type":"swap"}]"#,
            )
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(500)
            .expect(0)
            .create_async()
            .await;

        let listings = client(server.url(), 2)
            .active_listings(&[ExchangeType::Request])
            .await
            .unwrap();
        page1.assert_async().await;
        page2.assert_async().await;

        assert_eq!(listings.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_request_on_first_page_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/listings")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":"rest_invalid_param"}"#)
            .create_async()
            .await;

        let result = client(server.url(), 2).active_listings(&[ExchangeType::Give]).await;
        assert!(matches!(result, Err(RepositoryError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_owner_without_history() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/9/exchange-stats")
            .with_status(404)
            .create_async()
            .await;

        let stats = client(server.url(), 50).owner_stats(9).await.unwrap();
        assert!(stats.is_none());
    }
}
