//! Per-master-card serialization.
//!
//! The suppressor and the fresh read before create are heuristics: two truly
//! simultaneous deliveries can still race past both. Holding a keyed async
//! mutex for the whole reconciliation of one master card closes that gap.
//! Unrelated cards proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex over master card IDs.
#[derive(Debug, Default)]
pub struct CardLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `card_id`.
    ///
    /// The guard releases the card when dropped.
    pub async fn lock(&self, card_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map still references are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(card_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of cards with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
