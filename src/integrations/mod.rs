//! Integrations module
//!
//! The board-service seam, its Trello implementation, and the webhook
//! surface Trello delivers change events to.

pub mod traits;
pub mod trello;
pub mod webhooks;

pub use traits::{
    BoardList, BoardTracker, Card, CardUpdate, Label, NewCard, TrackerError, TrackerResult,
    Webhook, WebhookRegistration,
};
pub use trello::{TrelloClient, TrelloConfig, TRELLO_API_URL};
