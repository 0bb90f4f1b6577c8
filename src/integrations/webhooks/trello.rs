//! Trello webhook payloads and dispatch
//!
//! Parses Trello change notifications, keeps the ones that concern the
//! master list, and routes them to the mirror engine. Dispatch never fails:
//! payloads without an actionable event are accepted as no-ops, because Trello
//! treats any non-200 answer as "redeliver" and redelivery only multiplies
//! duplicate-mirror risk.

use std::sync::Arc;

use serde::Deserialize;

use crate::integrations::traits::Label;
use crate::mirror::{MirrorEngine, MirrorEvent, SyncSummary};

/// Trello webhook payload (subset consumed)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrelloWebhookPayload {
    #[serde(default)]
    pub action: Option<TrelloAction>,
}

/// The `action` object of a notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrelloAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub data: ActionData,
}

/// Entities referenced by an action
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    pub card: Option<EntityRef>,
    pub list: Option<EntityRef>,
    pub list_after: Option<EntityRef>,
    pub list_before: Option<EntityRef>,
    pub label: Option<Label>,
}

/// `{id, name}` reference to a card or list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Action types the mirror reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreateCard,
    UpdateCard,
    AddLabelToCard,
    RemoveLabelFromCard,
    DeleteCard,
    /// Any other Trello action; accepted and ignored
    Other,
}

impl ActionKind {
    pub fn parse(action_type: &str) -> Self {
        match action_type {
            "createCard" => ActionKind::CreateCard,
            "updateCard" => ActionKind::UpdateCard,
            "addLabelToCard" => ActionKind::AddLabelToCard,
            "removeLabelFromCard" => ActionKind::RemoveLabelFromCard,
            "deleteCard" => ActionKind::DeleteCard,
            _ => ActionKind::Other,
        }
    }

    fn is_label_change(self) -> bool {
        matches!(
            self,
            ActionKind::AddLabelToCard | ActionKind::RemoveLabelFromCard
        )
    }
}

impl TrelloAction {
    pub fn kind(&self) -> ActionKind {
        ActionKind::parse(&self.action_type)
    }

    /// IDs of every list the action names (`list`, `listAfter`, `listBefore`)
    pub fn list_ids(&self) -> impl Iterator<Item = &str> {
        [
            &self.data.list,
            &self.data.list_after,
            &self.data.list_before,
        ]
        .into_iter()
        .flatten()
        .map(|list| list.id.as_str())
    }

    /// Whether any location field names `list_id`
    pub fn touches_list(&self, list_id: &str) -> bool {
        self.list_ids().any(|id| id == list_id)
    }

    /// Translate into an engine event; `None` when required fields are missing
    pub fn to_event(&self) -> Option<MirrorEvent> {
        let card_id = self.data.card.as_ref()?.id.clone();
        let label = || self.data.label.clone();

        match self.kind() {
            ActionKind::CreateCard => Some(MirrorEvent::CardCreated { card_id }),
            ActionKind::UpdateCard => Some(MirrorEvent::CardUpdated { card_id }),
            ActionKind::AddLabelToCard => Some(MirrorEvent::LabelAdded {
                card_id,
                label: label()?,
            }),
            ActionKind::RemoveLabelFromCard => Some(MirrorEvent::LabelRemoved {
                card_id,
                label: label()?,
            }),
            ActionKind::DeleteCard => Some(MirrorEvent::CardDeleted { card_id }),
            ActionKind::Other => None,
        }
    }
}

/// What the dispatcher did with a notification
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Body was not a notification or carried no actionable event
    NoAction,
    /// Event concerned some other list
    OtherList,
    /// Action type the mirror does not handle
    Unsupported(String),
    /// Event was reconciled by the engine
    Reconciled(SyncSummary),
    /// Reconciliation panicked; only visible in the logs
    Crashed,
}

/// Routes master-list notifications to the mirror engine
pub struct NotificationDispatcher {
    engine: Arc<MirrorEngine>,
}

impl NotificationDispatcher {
    pub fn new(engine: Arc<MirrorEngine>) -> Self {
        Self { engine }
    }

    /// Parse a raw body; anything unparseable is treated as "no event"
    pub fn parse(body: &[u8]) -> Option<TrelloWebhookPayload> {
        if body.is_empty() {
            return None;
        }
        match serde_json::from_slice(body) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparseable webhook body");
                None
            }
        }
    }

    pub async fn dispatch_bytes(&self, body: &[u8]) -> DispatchOutcome {
        match Self::parse(body) {
            Some(payload) => self.dispatch(&payload).await,
            None => DispatchOutcome::NoAction,
        }
    }

    pub async fn dispatch(&self, payload: &TrelloWebhookPayload) -> DispatchOutcome {
        let Some(action) = &payload.action else {
            return DispatchOutcome::NoAction;
        };

        let kind = action.kind();
        if kind == ActionKind::Other {
            tracing::debug!(event_type = %action.action_type, "Ignoring unsupported action");
            return DispatchOutcome::Unsupported(action.action_type.clone());
        }

        let Some(event) = action.to_event() else {
            tracing::debug!(event_type = %action.action_type, "Action is missing card or label data");
            return DispatchOutcome::NoAction;
        };

        if !self.concerns_master_list(action, kind, event.card_id()).await {
            return DispatchOutcome::OtherList;
        }

        // Run on its own task so a panic is contained and still acknowledged.
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move { engine.apply(&event).await });
        match handle.await {
            Ok(summary) => DispatchOutcome::Reconciled(summary),
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation task failed");
                DispatchOutcome::Crashed
            }
        }
    }

    async fn concerns_master_list(&self, action: &TrelloAction, kind: ActionKind, card_id: &str) -> bool {
        let master_list_id = &self.engine.config().master_list_id;
        if action.touches_list(master_list_id) {
            return true;
        }
        // Label actions usually carry no list; ask where the card lives.
        if kind.is_label_change() && action.list_ids().next().is_none() {
            return self.engine.is_master_card(card_id).await;
        }
        false
    }
}
