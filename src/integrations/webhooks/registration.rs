//! One-shot webhook registration against the board service

use crate::integrations::traits::{BoardTracker, TrackerResult, Webhook, WebhookRegistration};

/// Description attached to the registered webhook
pub const WEBHOOK_DESCRIPTION: &str = "Trello Mirror Webhook - Card Updates";

/// Result of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new webhook was created
    Registered(Webhook),
    /// The service already has a webhook for this callback and board
    AlreadyExists,
}

/// Register `callback_url` to receive change events for `board_id`
///
/// A duplicate registration is reported as `AlreadyExists`, not as an error.
pub async fn register_board_webhook(
    tracker: &dyn BoardTracker,
    board_id: &str,
    callback_url: &str,
) -> TrackerResult<RegistrationOutcome> {
    let registration = WebhookRegistration {
        description: WEBHOOK_DESCRIPTION.to_string(),
        callback_url: callback_url.to_string(),
        id_model: board_id.to_string(),
    };

    tracing::info!(board_id, callback_url, "Registering webhook");

    match tracker.register_webhook(registration).await {
        Ok(webhook) => {
            tracing::info!(webhook_id = %webhook.id, "Webhook registered");
            Ok(RegistrationOutcome::Registered(webhook))
        }
        Err(e) if e.is_duplicate_webhook() => {
            tracing::info!(board_id, "Webhook already exists");
            Ok(RegistrationOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::trello::{TrelloClient, TrelloConfig};
    use crate::integrations::traits::TrackerError;
    use mockito::Matcher;
    use std::time::Duration;

    fn client(server: &mockito::ServerGuard) -> TrelloClient {
        let config = TrelloConfig::new("key", "token")
            .with_base_url(server.url())
            .with_pacing_delay(Duration::ZERO)
            .with_rate_limit_backoff(Duration::from_millis(1));
        TrelloClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_register_new_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhooks")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "callbackURL": "https://mirror.example.com/api/webhook",
                "idModel": "board-1",
                "description": WEBHOOK_DESCRIPTION,
            })))
            .with_status(200)
            .with_body(
                r#"{"id": "hook-1", "description": "Trello Mirror Webhook - Card Updates",
                    "callbackURL": "https://mirror.example.com/api/webhook"}"#,
            )
            .create_async()
            .await;

        let outcome = register_board_webhook(
            &client(&server),
            "board-1",
            "https://mirror.example.com/api/webhook",
        )
        .await
        .unwrap();

        mock.assert_async().await;
        match outcome {
            RegistrationOutcome::Registered(hook) => assert_eq!(hook.id, "hook-1"),
            other => panic!("expected Registered, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_is_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/webhooks")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("A webhook already exists with that callback, model, and token")
            .create_async()
            .await;

        let outcome = register_board_webhook(&client(&server), "board-1", "https://x/api/webhook")
            .await
            .unwrap();

        assert_eq!(outcome, RegistrationOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_register_other_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/webhooks")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("invalid token")
            .create_async()
            .await;

        let err = register_board_webhook(&client(&server), "board-1", "https://x/api/webhook")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TrackerError::Api {
                status: 401,
                body: "invalid token".to_string()
            }
        );
    }
}
