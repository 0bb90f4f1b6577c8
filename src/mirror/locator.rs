//! Mirror lookup by back-reference.
//!
//! Mirrors are found by scanning every non-master list for cards whose
//! description carries the master's back-reference tag. The scan is
//! O(lists x cards); boards are small and the list set comes from the cache.

use std::sync::Arc;

use super::backref;
use super::list_cache::ListCache;
use crate::integrations::traits::{BoardList, BoardTracker, Card, TrackerResult};

/// A mirror card together with the list holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorCard {
    pub card: Card,
    pub list: BoardList,
}

/// Finds the mirror cards of a master card.
pub struct MirrorLocator {
    tracker: Arc<dyn BoardTracker>,
    lists: Arc<ListCache>,
    master_list_id: String,
}

impl MirrorLocator {
    pub fn new(
        tracker: Arc<dyn BoardTracker>,
        lists: Arc<ListCache>,
        master_list_id: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            lists,
            master_list_id: master_list_id.into(),
        }
    }

    /// All mirrors of `master_id` across every non-master list.
    ///
    /// Any lookup error is logged and yields an empty result; callers treat
    /// "lookup failed" the same as "no mirrors".
    pub async fn find_mirrors(&self, master_id: &str) -> Vec<MirrorCard> {
        match self.scan(master_id).await {
            Ok(mirrors) => {
                tracing::debug!(card_id = master_id, count = mirrors.len(), "Located mirrors");
                mirrors
            }
            Err(e) => {
                tracing::warn!(card_id = master_id, error = %e, "Failed to locate mirrors");
                Vec::new()
            }
        }
    }

    async fn scan(&self, master_id: &str) -> TrackerResult<Vec<MirrorCard>> {
        let mut mirrors = Vec::new();

        for list in self.lists.lists().await? {
            if list.id == self.master_list_id {
                continue;
            }
            for card in self.mirrors_in_list(&list, master_id).await? {
                mirrors.push(MirrorCard {
                    card,
                    list: list.clone(),
                });
            }
        }

        Ok(mirrors)
    }

    /// Fresh read of one list's mirrors of `master_id`.
    pub async fn mirrors_in_list(
        &self,
        list: &BoardList,
        master_id: &str,
    ) -> TrackerResult<Vec<Card>> {
        let cards = self.tracker.list_cards(&list.id).await?;
        Ok(cards
            .into_iter()
            .filter(|card| backref::references(&card.desc, master_id))
            .collect())
    }
}
