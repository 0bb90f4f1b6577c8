//! Board service traits
//!
//! This module defines the seam between the mirror engine and the card-tracking
//! service it drives, together with the wire types both sides exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A label attached to a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Provider label ID
    pub id: String,
    /// Display name; mirror lists are keyed by this
    #[serde(default)]
    pub name: String,
    /// Label color (Trello allows colorless labels)
    #[serde(default)]
    pub color: Option<String>,
}

impl Label {
    /// Create a label with the given id, name and color
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.map(String::from),
        }
    }
}

/// A card as returned by the board service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Provider card ID
    pub id: String,
    /// Card title
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub desc: String,
    /// ID of the list holding the card
    #[serde(rename = "idList", default)]
    pub id_list: String,
    /// Labels in the order the service returns them
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// A list on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardList {
    /// Provider list ID
    pub id: String,
    /// List name
    pub name: String,
    /// Whether the list is archived
    #[serde(default)]
    pub closed: bool,
}

impl BoardList {
    /// Create an open list
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            closed: false,
        }
    }
}

/// Request to create a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCard {
    /// Target list
    #[serde(rename = "idList")]
    pub id_list: String,
    /// Card title
    pub name: String,
    /// Card description
    pub desc: String,
}

/// Request to overwrite a card's name and description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardUpdate {
    pub name: String,
    pub desc: String,
}

/// Request to register a webhook on a model (board)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookRegistration {
    /// Human-readable description shown in the service
    pub description: String,
    /// URL the service will POST change events to
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    /// ID of the watched model
    #[serde(rename = "idModel")]
    pub id_model: String,
}

/// A registered webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "callbackURL", default)]
    pub callback_url: String,
}

/// Error type for board service operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The service answered with a non-success status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The request never produced a response
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Upstream HTTP status, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is the service's answer to registering a webhook twice
    pub fn is_duplicate_webhook(&self) -> bool {
        matches!(self, TrackerError::Api { status: 400, body } if body.contains("webhook already exists"))
    }
}

/// Result type for board service operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Operations the mirror engine needs from a card-tracking board
///
/// `TrelloClient` is the production implementation. Tests substitute an
/// in-memory board.
#[async_trait]
pub trait BoardTracker: Send + Sync {
    /// Returns the name of this provider (e.g., "trello")
    fn name(&self) -> &str;

    /// List the open lists on a board
    async fn board_lists(&self, board_id: &str) -> TrackerResult<Vec<BoardList>>;

    /// Create a list positioned at the end of the board
    async fn create_list(&self, board_id: &str, name: &str) -> TrackerResult<BoardList>;

    /// List the cards in a list
    async fn list_cards(&self, list_id: &str) -> TrackerResult<Vec<Card>>;

    /// Fetch one card including its labels
    async fn get_card(&self, card_id: &str) -> TrackerResult<Card>;

    async fn create_card(&self, card: NewCard) -> TrackerResult<Card>;

    async fn update_card(&self, card_id: &str, update: CardUpdate) -> TrackerResult<Card>;

    async fn delete_card(&self, card_id: &str) -> TrackerResult<()>;

    /// Register a webhook callback
    async fn register_webhook(&self, registration: WebhookRegistration)
        -> TrackerResult<Webhook>;
}
