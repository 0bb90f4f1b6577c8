//! Reconciliation engine for mirror cards
//!
//! This module provides the `MirrorEngine`, which reacts to a change on a
//! master card by computing which mirror cards should exist (one per label,
//! in the list named after the label) and applying the create, update and
//! delete calls needed to get there.
//!
//! Every external step is failure-isolated: a failed list creation or card
//! write is logged and recorded in the returned `SyncSummary`, and the
//! remaining labels are still processed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::backref;
use super::card_locks::CardLocks;
use super::clock::{Clock, SystemClock};
use super::list_cache::{ListCache, DEFAULT_LIST_CACHE_TTL};
use super::locator::{MirrorCard, MirrorLocator};
use super::suppressor::{DuplicateSuppressor, DEFAULT_SUPPRESSION_WINDOW};
use crate::integrations::traits::{
    BoardList, BoardTracker, Card, CardUpdate, Label, NewCard, TrackerResult,
};

/// Configuration for the mirror engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Board holding the master list and every mirror list
    pub board_id: String,
    /// The list whose cards are mirrored
    pub master_list_id: String,
    /// Age after which the cached list set is re-fetched
    pub list_cache_ttl: Duration,
    /// Window during which a repeated create is suppressed
    pub suppression_window: Duration,
    /// Delete mirrors for labels no longer on the card when handling updates
    pub prune_removed_labels: bool,
    /// Serialize reconciliations of the same master card
    pub serialize_per_card: bool,
}

impl EngineConfig {
    pub fn new(board_id: impl Into<String>, master_list_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            master_list_id: master_list_id.into(),
            list_cache_ttl: DEFAULT_LIST_CACHE_TTL,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            prune_removed_labels: true,
            serialize_per_card: true,
        }
    }

    pub fn with_prune_removed_labels(mut self, enabled: bool) -> Self {
        self.prune_removed_labels = enabled;
        self
    }

    pub fn with_serialize_per_card(mut self, enabled: bool) -> Self {
        self.serialize_per_card = enabled;
        self
    }

    pub fn with_list_cache_ttl(mut self, ttl: Duration) -> Self {
        self.list_cache_ttl = ttl;
        self
    }

    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }
}

/// A change to a master card that the engine reconciles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    CardCreated { card_id: String },
    CardUpdated { card_id: String },
    LabelAdded { card_id: String, label: Label },
    LabelRemoved { card_id: String, label: Label },
    CardDeleted { card_id: String },
}

impl MirrorEvent {
    /// The master card this event concerns
    pub fn card_id(&self) -> &str {
        match self {
            MirrorEvent::CardCreated { card_id }
            | MirrorEvent::CardUpdated { card_id }
            | MirrorEvent::LabelAdded { card_id, .. }
            | MirrorEvent::LabelRemoved { card_id, .. }
            | MirrorEvent::CardDeleted { card_id } => card_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorEvent::CardCreated { .. } => "card_created",
            MirrorEvent::CardUpdated { .. } => "card_updated",
            MirrorEvent::LabelAdded { .. } => "label_added",
            MirrorEvent::LabelRemoved { .. } => "label_removed",
            MirrorEvent::CardDeleted { .. } => "card_deleted",
        }
    }
}

/// Type of action taken for one mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// A mirror card was created
    Created,
    /// A mirror card was rewritten to match its master
    Updated,
    /// A mirror card was removed
    Deleted,
    /// Nothing needed doing, or the write was suppressed
    Skipped,
    /// An external call failed; other mirrors were still processed
    Failed,
}

/// Outcome of one reconciliation step
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Master card being reconciled
    pub master_card_id: String,
    /// Mirror list involved, if one was resolved
    pub list_id: Option<String>,
    pub list_name: Option<String>,
    /// Mirror card involved, if any
    pub mirror_id: Option<String>,
    pub action: SyncAction,
    /// Why the step was skipped or failed
    pub reason: Option<String>,
}

impl SyncResult {
    fn new(master_card_id: &str, action: SyncAction) -> Self {
        Self {
            master_card_id: master_card_id.to_string(),
            list_id: None,
            list_name: None,
            mirror_id: None,
            action,
            reason: None,
        }
    }

    fn in_list(mut self, list: &BoardList) -> Self {
        self.list_id = Some(list.id.clone());
        self.list_name = Some(list.name.clone());
        self
    }

    fn named(mut self, list_name: &str) -> Self {
        self.list_name = Some(list_name.to_string());
        self
    }

    fn mirror(mut self, mirror_id: &str) -> Self {
        self.mirror_id = Some(mirror_id.to_string());
        self
    }

    fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Summary of one reconciliation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    /// Total number of steps recorded
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Individual results in processing order
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: SyncResult) {
        self.total += 1;
        match result.action {
            SyncAction::Created => self.created += 1,
            SyncAction::Updated => self.updated += 1,
            SyncAction::Deleted => self.deleted += 1,
            SyncAction::Skipped => self.skipped += 1,
            SyncAction::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Check if no step failed
    pub fn all_successful(&self) -> bool {
        self.failed == 0
    }

    /// Number of writes issued against the board
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Result of a manual resync
#[derive(Debug, Clone)]
pub struct ResyncOutcome {
    /// The master card as currently stored
    pub master: Card,
    pub summary: SyncSummary,
}

/// Engine for reconciling mirror cards against their master card
pub struct MirrorEngine {
    tracker: Arc<dyn BoardTracker>,
    config: EngineConfig,
    lists: Arc<ListCache>,
    locator: MirrorLocator,
    suppressor: DuplicateSuppressor,
    locks: CardLocks,
}

impl MirrorEngine {
    /// Create an engine driven by the system clock
    pub fn new(tracker: Arc<dyn BoardTracker>, config: EngineConfig) -> Self {
        Self::with_clock(tracker, config, Arc::new(SystemClock))
    }

    /// Create an engine whose cache and suppression windows use `clock`
    pub fn with_clock(
        tracker: Arc<dyn BoardTracker>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lists = Arc::new(ListCache::new(
            tracker.clone(),
            config.board_id.clone(),
            config.list_cache_ttl,
            clock.clone(),
        ));
        let locator = MirrorLocator::new(
            tracker.clone(),
            lists.clone(),
            config.master_list_id.clone(),
        );
        let suppressor = DuplicateSuppressor::new(config.suppression_window, clock);

        Self {
            tracker,
            config,
            lists,
            locator,
            suppressor,
            locks: CardLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile the mirrors of the card named by `event`
    ///
    /// Never fails: every problem is logged and reported in the summary.
    pub async fn apply(&self, event: &MirrorEvent) -> SyncSummary {
        let _guard = if self.config.serialize_per_card {
            Some(self.locks.lock(event.card_id()).await)
        } else {
            None
        };

        tracing::info!(
            event_type = event.kind(),
            card_id = event.card_id(),
            "Reconciling master card"
        );

        let summary = match event {
            MirrorEvent::CardCreated { card_id } => self.on_card_created(card_id).await,
            MirrorEvent::CardUpdated { card_id } => self.on_card_updated(card_id).await,
            MirrorEvent::LabelAdded { card_id, label } => {
                self.on_label_added(card_id, label).await
            }
            MirrorEvent::LabelRemoved { card_id, label } => {
                self.on_label_removed(card_id, label).await
            }
            MirrorEvent::CardDeleted { card_id } => self.on_card_deleted(card_id).await,
        };

        tracing::info!(
            event_type = event.kind(),
            card_id = event.card_id(),
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Reconciliation finished"
        );
        summary
    }

    /// Whether `card_id` currently sits on the master list
    ///
    /// Used for events that carry no list reference. A failed lookup counts
    /// as "not a master card".
    pub async fn is_master_card(&self, card_id: &str) -> bool {
        match self.tracker.get_card(card_id).await {
            Ok(card) => card.id_list == self.config.master_list_id,
            Err(e) => {
                tracing::warn!(card_id, error = %e, "Failed to look up card list");
                false
            }
        }
    }

    /// Push the master's current name and description to its existing mirrors
    ///
    /// Unlike `apply`, a failure to read the master card is returned.
    pub async fn resync(&self, card_id: &str) -> TrackerResult<ResyncOutcome> {
        let _guard = if self.config.serialize_per_card {
            Some(self.locks.lock(card_id).await)
        } else {
            None
        };

        let master = self.tracker.get_card(card_id).await?;
        let mut summary = SyncSummary::new();
        for mirror in self.locator.find_mirrors(card_id).await {
            summary.add_result(self.update_mirror(&master, &mirror).await);
        }

        Ok(ResyncOutcome { master, summary })
    }

    async fn on_card_created(&self, card_id: &str) -> SyncSummary {
        let mut summary = SyncSummary::new();

        // Re-delivered creation events find the mirrors from the first run.
        let existing = self.locator.find_mirrors(card_id).await;
        if !existing.is_empty() {
            tracing::info!(
                card_id,
                mirrors = existing.len(),
                "Card already mirrored, skipping create"
            );
            summary.add_result(
                SyncResult::new(card_id, SyncAction::Skipped).reason("card already mirrored"),
            );
            return summary;
        }

        let Some(master) = self.fetch_master(card_id, &mut summary).await else {
            return summary;
        };
        if master.labels.is_empty() {
            tracing::debug!(card_id, "Card has no labels, nothing to mirror");
            return summary;
        }

        let mut seen_lists = HashSet::new();
        for label in &master.labels {
            if let Some(result) = self.mirror_label(&master, label, &mut seen_lists).await {
                summary.add_result(result);
            }
        }
        summary
    }

    async fn on_card_updated(&self, card_id: &str) -> SyncSummary {
        let mut summary = SyncSummary::new();

        let Some(master) = self.fetch_master(card_id, &mut summary).await else {
            return summary;
        };
        let mirrors = self.locator.find_mirrors(card_id).await;
        let label_names: HashSet<&str> = master.labels.iter().map(|l| l.name.as_str()).collect();

        let mut mirrored_lists = HashSet::new();
        for mirror in &mirrors {
            if self.config.prune_removed_labels && !label_names.contains(mirror.list.name.as_str())
            {
                summary.add_result(self.delete_mirror(card_id, &mirror.card, &mirror.list).await);
                continue;
            }
            mirrored_lists.insert(mirror.list.id.clone());
            summary.add_result(self.update_mirror(&master, mirror).await);
        }

        // Lists that kept a mirror above are already in the seen set.
        for label in &master.labels {
            if let Some(result) = self.mirror_label(&master, label, &mut mirrored_lists).await {
                summary.add_result(result);
            }
        }
        summary
    }

    async fn on_label_added(&self, card_id: &str, label: &Label) -> SyncSummary {
        let mut summary = SyncSummary::new();

        if label.name.is_empty() {
            summary.add_result(
                SyncResult::new(card_id, SyncAction::Skipped).reason("label has no name"),
            );
            return summary;
        }
        let Some(list) = self.lists.resolve_or_create(&label.name).await else {
            summary.add_result(
                SyncResult::new(card_id, SyncAction::Failed)
                    .named(&label.name)
                    .reason("mirror list unavailable"),
            );
            return summary;
        };

        match self.locator.mirrors_in_list(&list, card_id).await {
            Ok(existing) if !existing.is_empty() => {
                summary.add_result(
                    SyncResult::new(card_id, SyncAction::Skipped)
                        .in_list(&list)
                        .mirror(&existing[0].id)
                        .reason("mirror already exists"),
                );
                return summary;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(card_id, list_id = %list.id, error = %e, "Failed to read mirror list");
                summary.add_result(
                    SyncResult::new(card_id, SyncAction::Failed)
                        .in_list(&list)
                        .reason(e.to_string()),
                );
                return summary;
            }
        }

        let Some(master) = self.fetch_master(card_id, &mut summary).await else {
            return summary;
        };
        summary.add_result(self.ensure_mirror(&master, &list).await);
        summary
    }

    async fn on_label_removed(&self, card_id: &str, label: &Label) -> SyncSummary {
        let mut summary = SyncSummary::new();

        let Some(list) = self.lists.find(&label.name).await else {
            summary.add_result(
                SyncResult::new(card_id, SyncAction::Skipped)
                    .named(&label.name)
                    .reason("no mirror list for label"),
            );
            return summary;
        };

        match self.locator.mirrors_in_list(&list, card_id).await {
            Ok(mirrors) if mirrors.is_empty() => {
                summary.add_result(
                    SyncResult::new(card_id, SyncAction::Skipped)
                        .in_list(&list)
                        .reason("no mirror in list"),
                );
            }
            Ok(mirrors) => {
                for mirror in &mirrors {
                    summary.add_result(self.delete_mirror(card_id, mirror, &list).await);
                }
            }
            Err(e) => {
                tracing::warn!(card_id, list_id = %list.id, error = %e, "Failed to read mirror list");
                summary.add_result(
                    SyncResult::new(card_id, SyncAction::Failed)
                        .in_list(&list)
                        .reason(e.to_string()),
                );
            }
        }
        summary
    }

    async fn on_card_deleted(&self, card_id: &str) -> SyncSummary {
        let mut summary = SyncSummary::new();
        for mirror in self.locator.find_mirrors(card_id).await {
            summary.add_result(self.delete_mirror(card_id, &mirror.card, &mirror.list).await);
        }
        summary
    }

    async fn fetch_master(&self, card_id: &str, summary: &mut SyncSummary) -> Option<Card> {
        match self.tracker.get_card(card_id).await {
            Ok(card) => Some(card),
            Err(e) => {
                tracing::error!(card_id, error = %e, "Failed to fetch master card");
                summary.add_result(
                    SyncResult::new(card_id, SyncAction::Failed).reason(e.to_string()),
                );
                None
            }
        }
    }

    /// Resolve the label's list and make sure it holds a mirror.
    ///
    /// Returns `None` for a label whose list was already handled in this pass
    /// (two labels sharing a display name map to one list).
    async fn mirror_label(
        &self,
        master: &Card,
        label: &Label,
        seen_lists: &mut HashSet<String>,
    ) -> Option<SyncResult> {
        if label.name.is_empty() {
            return Some(
                SyncResult::new(&master.id, SyncAction::Skipped).reason("label has no name"),
            );
        }

        let Some(list) = self.lists.resolve_or_create(&label.name).await else {
            return Some(
                SyncResult::new(&master.id, SyncAction::Failed)
                    .named(&label.name)
                    .reason("mirror list unavailable"),
            );
        };
        if !seen_lists.insert(list.id.clone()) {
            return None;
        }

        Some(self.ensure_mirror(master, &list).await)
    }

    /// Create a mirror in `list` unless one exists or the create is a
    /// recent duplicate.
    async fn ensure_mirror(&self, master: &Card, list: &BoardList) -> SyncResult {
        match self.locator.mirrors_in_list(list, &master.id).await {
            Ok(existing) if !existing.is_empty() => {
                return SyncResult::new(&master.id, SyncAction::Skipped)
                    .in_list(list)
                    .mirror(&existing[0].id)
                    .reason("mirror already exists");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(card_id = %master.id, list_id = %list.id, error = %e, "Failed to read mirror list");
                return SyncResult::new(&master.id, SyncAction::Failed)
                    .in_list(list)
                    .reason(e.to_string());
            }
        }

        if self.suppressor.should_suppress_create(&master.id, &list.id) {
            return SyncResult::new(&master.id, SyncAction::Skipped)
                .in_list(list)
                .reason("duplicate create suppressed");
        }

        let request = NewCard {
            id_list: list.id.clone(),
            name: master.name.clone(),
            desc: backref::mirror_description(&master.desc, &master.id),
        };
        match self.tracker.create_card(request).await {
            Ok(card) => {
                tracing::info!(
                    card_id = %master.id,
                    mirror_id = %card.id,
                    list = %list.name,
                    "Created mirror card"
                );
                SyncResult::new(&master.id, SyncAction::Created)
                    .in_list(list)
                    .mirror(&card.id)
            }
            Err(e) => {
                tracing::error!(card_id = %master.id, list = %list.name, error = %e, "Failed to create mirror card");
                // The list may have been deleted or archived behind the cache.
                if matches!(e.status(), Some(400) | Some(404)) {
                    self.lists.invalidate().await;
                }
                SyncResult::new(&master.id, SyncAction::Failed)
                    .in_list(list)
                    .reason(e.to_string())
            }
        }
    }

    async fn update_mirror(&self, master: &Card, mirror: &MirrorCard) -> SyncResult {
        let desc = backref::mirror_description(&master.desc, &master.id);
        if mirror.card.name == master.name && mirror.card.desc == desc {
            return SyncResult::new(&master.id, SyncAction::Skipped)
                .in_list(&mirror.list)
                .mirror(&mirror.card.id)
                .reason("already in sync");
        }

        let update = CardUpdate {
            name: master.name.clone(),
            desc,
        };
        match self.tracker.update_card(&mirror.card.id, update).await {
            Ok(_) => {
                tracing::info!(card_id = %master.id, mirror_id = %mirror.card.id, "Updated mirror card");
                SyncResult::new(&master.id, SyncAction::Updated)
                    .in_list(&mirror.list)
                    .mirror(&mirror.card.id)
            }
            Err(e) => {
                tracing::error!(mirror_id = %mirror.card.id, error = %e, "Failed to update mirror card");
                SyncResult::new(&master.id, SyncAction::Failed)
                    .in_list(&mirror.list)
                    .mirror(&mirror.card.id)
                    .reason(e.to_string())
            }
        }
    }

    async fn delete_mirror(&self, master_id: &str, mirror: &Card, list: &BoardList) -> SyncResult {
        match self.tracker.delete_card(&mirror.id).await {
            Ok(()) => {
                tracing::info!(card_id = master_id, mirror_id = %mirror.id, list = %list.name, "Deleted mirror card");
                SyncResult::new(master_id, SyncAction::Deleted)
                    .in_list(list)
                    .mirror(&mirror.id)
            }
            Err(e) => {
                tracing::error!(mirror_id = %mirror.id, error = %e, "Failed to delete mirror card");
                SyncResult::new(master_id, SyncAction::Failed)
                    .in_list(list)
                    .mirror(&mirror.id)
                    .reason(e.to_string())
            }
        }
    }
}
