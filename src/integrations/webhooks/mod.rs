//! Webhooks module
//!
//! Receives Trello change notifications over HTTP and registers the
//! callback with Trello.

pub mod registration;
pub mod server;
pub mod trello;

pub use registration::{register_board_webhook, RegistrationOutcome, WEBHOOK_DESCRIPTION};
pub use server::{
    create_webhook_router, serve, AppState, WebhookConfig, WebhookError, WebhookResult,
};
pub use trello::{DispatchOutcome, NotificationDispatcher, TrelloWebhookPayload};
