//! Trello integration provider
//!
//! This module implements the BoardTracker trait for Trello's REST API.
//! Every call carries the API key and token as query parameters. A 429 is
//! retried exactly once after a fixed backoff, and every successful call is
//! followed by a short pacing delay so bursts of sequential calls stay under
//! the upstream rate limit.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::traits::{
    BoardList, BoardTracker, Card, CardUpdate, NewCard, TrackerError, TrackerResult, Webhook,
    WebhookRegistration,
};

/// Trello REST API root
pub const TRELLO_API_URL: &str = "https://api.trello.com/1";

/// Configuration for the Trello provider
#[derive(Debug, Clone)]
pub struct TrelloConfig {
    /// Trello API key
    pub api_key: String,
    /// Trello member token
    pub token: String,
    /// API root; overridden in tests
    pub base_url: String,
    /// Wait before the single retry of a rate-limited call
    pub rate_limit_backoff: Duration,
    /// Wait after every successful call
    pub pacing_delay: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl TrelloConfig {
    /// Create a config for the public API with default pacing
    pub fn new(api_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            token: token.into(),
            base_url: TRELLO_API_URL.to_string(),
            rate_limit_backoff: Duration::from_secs(1),
            pacing_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Trello provider
pub struct TrelloClient {
    /// HTTP client for API requests
    client: Client,
    /// Provider configuration
    config: TrelloConfig,
}

impl TrelloClient {
    /// Create a new Trello provider
    pub fn new(config: TrelloConfig) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TrelloConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Issue one API call and return the decoded JSON body
    ///
    /// An empty success body decodes to `Value::Null`. Any non-success status
    /// (including a second 429) becomes `TrackerError::Api` carrying the
    /// upstream status and body.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> TrackerResult<Value> {
        let mut retried = false;

        loop {
            let response = self.send(method.clone(), path, body).await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && !retried {
                tracing::warn!(
                    method = %method,
                    path,
                    backoff_ms = self.config.rate_limit_backoff.as_millis() as u64,
                    "Trello rate limit hit, retrying once"
                );
                tokio::time::sleep(self.config.rate_limit_backoff).await;
                retried = true;
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                tracing::error!(
                    method = %method,
                    path,
                    status = status.as_u16(),
                    body = %error_text,
                    "Trello API error"
                );
                return Err(TrackerError::Api {
                    status: status.as_u16(),
                    body: error_text,
                });
            }

            let text = response
                .text()
                .await
                .map_err(|e| TrackerError::Http(format!("Failed to read response: {}", e)))?;

            tokio::time::sleep(self.config.pacing_delay).await;

            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| TrackerError::Decode(e.to_string()));
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> TrackerResult<reqwest::Response> {
        let mut request = self.client.request(method, self.url(path)).query(&[
            ("key", self.config.api_key.as_str()),
            ("token", self.config.token.as_str()),
        ]);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> TrackerResult<T> {
        let value = self.call(method, path, body).await?;
        serde_json::from_value(value).map_err(|e| TrackerError::Decode(e.to_string()))
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> TrackerResult<Value> {
    serde_json::to_value(value).map_err(|e| TrackerError::Decode(e.to_string()))
}

#[async_trait]
impl BoardTracker for TrelloClient {
    fn name(&self) -> &str {
        "trello"
    }

    async fn board_lists(&self, board_id: &str) -> TrackerResult<Vec<BoardList>> {
        self.call_as(Method::GET, &format!("/boards/{}/lists", board_id), None)
            .await
    }

    async fn create_list(&self, board_id: &str, name: &str) -> TrackerResult<BoardList> {
        let body = json!({
            "name": name,
            "idBoard": board_id,
            "pos": "bottom",
        });
        self.call_as(Method::POST, "/lists", Some(&body)).await
    }

    async fn list_cards(&self, list_id: &str) -> TrackerResult<Vec<Card>> {
        self.call_as(Method::GET, &format!("/lists/{}/cards", list_id), None)
            .await
    }

    async fn get_card(&self, card_id: &str) -> TrackerResult<Card> {
        self.call_as(Method::GET, &format!("/cards/{}", card_id), None)
            .await
    }

    async fn create_card(&self, card: NewCard) -> TrackerResult<Card> {
        let body = to_body(&card)?;
        self.call_as(Method::POST, "/cards", Some(&body)).await
    }

    async fn update_card(&self, card_id: &str, update: CardUpdate) -> TrackerResult<Card> {
        let body = to_body(&update)?;
        self.call_as(Method::PUT, &format!("/cards/{}", card_id), Some(&body))
            .await
    }

    async fn delete_card(&self, card_id: &str) -> TrackerResult<()> {
        self.call(Method::DELETE, &format!("/cards/{}", card_id), None)
            .await?;
        Ok(())
    }

    async fn register_webhook(
        &self,
        registration: WebhookRegistration,
    ) -> TrackerResult<Webhook> {
        let body = to_body(&registration)?;
        self.call_as(Method::POST, "/webhooks", Some(&body)).await
    }
}
