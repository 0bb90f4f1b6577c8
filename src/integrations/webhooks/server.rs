//! Webhook server implementation
//!
//! Provides the HTTP surface of the mirror: the Trello callback endpoint
//! (served at both `/webhook` and `/api/webhook`), a status index, and a
//! manual resync endpoint for operators.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::trello::{DispatchOutcome, NotificationDispatcher};
use crate::integrations::traits::TrackerError;
use crate::mirror::MirrorEngine;

/// Webhook server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub bind_address: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

impl WebhookConfig {
    /// Create a new WebhookConfig with the given port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Get the full bind address (ip:port)
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Shared application state for the webhook server
#[derive(Clone)]
pub struct AppState {
    /// Engine used by the manual resync endpoint
    pub engine: Arc<MirrorEngine>,
    /// Routes Trello notifications to the engine
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl AppState {
    pub fn new(engine: Arc<MirrorEngine>) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(engine.clone()));
        Self { engine, dispatcher }
    }
}

/// Webhook error types
#[derive(Debug, Clone)]
pub enum WebhookError {
    /// The board service failed while serving a manual request
    Tracker(TrackerError),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::Tracker(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WebhookError {}

impl From<TrackerError> for WebhookError {
    fn from(e: TrackerError) -> Self {
        WebhookError::Tracker(e)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Tracker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for webhook operations
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Status index response
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub message: String,
    pub endpoints: IndexEndpoints,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexEndpoints {
    pub webhook: String,
}

/// Readiness response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub message: String,
    pub status: String,
}

/// Acknowledgement sent for every delivered notification
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub message: String,
    pub received: bool,
}

/// Answer for methods the webhook endpoint does not serve
#[derive(Debug, Serialize, Deserialize)]
pub struct MethodNotAllowedResponse {
    pub error: String,
    pub method: String,
}

/// Manual resync response
#[derive(Debug, Serialize, Deserialize)]
pub struct TestSyncResponse {
    pub message: String,
    pub master_card: String,
    pub mirrors_updated: usize,
}

/// Create the webhook router with all routes
pub fn create_webhook_router(state: AppState) -> Router {
    // Every notification is acknowledged, including ones past axum's 2 MB default.
    let webhook = any(webhook_handler).layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/", get(index_handler))
        .route("/webhook", webhook.clone())
        .route("/api/webhook", webhook)
        .route("/test-sync/{card_id}", post(test_sync_handler))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &WebhookConfig, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!(address = %config.socket_addr(), "Webhook server listening");

    axum::serve(listener, create_webhook_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// GET /
pub async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Trello mirror webhook server is running".to_string(),
        endpoints: IndexEndpoints {
            webhook: "/api/webhook".to_string(),
        },
    })
}

/// Trello callback endpoint
///
/// GET and HEAD answer the check Trello sends when a webhook is registered.
/// POST is always acknowledged with 200, whatever the body holds.
pub async fn webhook_handler(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Response {
    match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::GET | Method::HEAD => Json(ReadyResponse {
            message: "Webhook endpoint is active".to_string(),
            status: "ready".to_string(),
        })
        .into_response(),
        Method::POST => {
            match state.dispatcher.dispatch_bytes(&body).await {
                DispatchOutcome::Reconciled(summary) => {
                    tracing::debug!(writes = summary.writes(), "Notification reconciled")
                }
                outcome => tracing::debug!(?outcome, "Notification ignored"),
            }
            Json(WebhookAck {
                message: "OK".to_string(),
                received: true,
            })
            .into_response()
        }
        other => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(MethodNotAllowedResponse {
                error: "Method not allowed".to_string(),
                method: other.to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /test-sync/{card_id}
///
/// Pushes the master card's current name and description to its mirrors.
pub async fn test_sync_handler(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> WebhookResult<Json<TestSyncResponse>> {
    let outcome = state.engine.resync(&card_id).await.map_err(|e| {
        tracing::error!(card_id = %card_id, error = %e, "Manual sync failed");
        WebhookError::from(e)
    })?;

    Ok(Json(TestSyncResponse {
        message: "Sync test completed".to_string(),
        master_card: outcome.master.name,
        mirrors_updated: outcome.summary.total,
    }))
}
