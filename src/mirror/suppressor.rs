//! Duplicate-notification suppression.
//!
//! One logical edit can arrive as several near-simultaneous notifications
//! (say `addLabelToCard` plus `updateCard`). Both would race to create the
//! same mirror before either read-before-write check sees the other's write.
//! The suppressor remembers each create attempt for a short window and
//! rejects repeats of the same (card, list) pair inside it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::clock::Clock;

/// Default window during which a repeated create is treated as a duplicate.
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(30);

/// Kind of gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SuppressionKey {
    master_card_id: String,
    target_list_id: String,
    operation: OperationKind,
}

/// Time-window duplicate filter for mirror creation.
#[derive(Debug)]
pub struct DuplicateSuppressor {
    window: Duration,
    clock: Arc<dyn Clock>,
    attempts: Mutex<HashMap<SuppressionKey, Instant>>,
}

impl DuplicateSuppressor {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Whether creating a mirror of `master_card_id` in `target_list_id`
    /// repeats an attempt made within the window.
    ///
    /// Expired entries are evicted first. A create that is let through is
    /// recorded, so the next identical call inside the window returns `true`.
    pub fn should_suppress_create(&self, master_card_id: &str, target_list_id: &str) -> bool {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);

        attempts.retain(|_, at| now.saturating_duration_since(*at) <= self.window);

        let key = SuppressionKey {
            master_card_id: master_card_id.to_string(),
            target_list_id: target_list_id.to_string(),
            operation: OperationKind::Create,
        };
        if attempts.contains_key(&key) {
            tracing::info!(
                card_id = master_card_id,
                list_id = target_list_id,
                "Suppressing duplicate mirror create"
            );
            return true;
        }

        attempts.insert(key, now);
        false
    }

    /// Number of attempts currently remembered.
    pub fn tracked(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
