//! Label-name to mirror-list resolution.
//!
//! The board service has no notion of "the list for label X"; the mapping is
//! purely by name. `ListCache` keeps the board's lists for a bounded window
//! and creates a missing list at the end of the board on first use. A newly
//! created list is appended in memory instead of forcing a re-fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::clock::Clock;
use crate::integrations::traits::{BoardList, BoardTracker, TrackerResult};

/// Default age after which the cached list set is re-fetched.
pub const DEFAULT_LIST_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct CachedLists {
    lists: Vec<BoardList>,
    fetched_at: Instant,
}

/// TTL-bound cache of the board's lists.
pub struct ListCache {
    tracker: Arc<dyn BoardTracker>,
    board_id: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    // Held across refresh and creation so two labels with the same name
    // resolve to one list.
    state: Mutex<Option<CachedLists>>,
}

impl ListCache {
    pub fn new(
        tracker: Arc<dyn BoardTracker>,
        board_id: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            board_id: board_id.into(),
            ttl,
            clock,
            state: Mutex::new(None),
        }
    }

    fn is_fresh(&self, cached: &CachedLists) -> bool {
        !cached.lists.is_empty()
            && self.clock.now().saturating_duration_since(cached.fetched_at) <= self.ttl
    }

    async fn refresh_if_stale<'a>(
        &self,
        state: &'a mut Option<CachedLists>,
    ) -> TrackerResult<&'a mut CachedLists> {
        let stale = state.as_ref().map_or(true, |cached| !self.is_fresh(cached));
        if stale {
            let lists = self
                .tracker
                .board_lists(&self.board_id)
                .await?
                .into_iter()
                .filter(|list| !list.closed)
                .collect::<Vec<_>>();
            tracing::debug!(board_id = %self.board_id, count = lists.len(), "Refreshed board lists");
            *state = Some(CachedLists {
                lists,
                fetched_at: self.clock.now(),
            });
        }
        // Populated above when absent.
        Ok(state.get_or_insert_with(|| CachedLists {
            lists: Vec::new(),
            fetched_at: self.clock.now(),
        }))
    }

    /// All open lists on the board, refreshed when stale or empty.
    pub async fn lists(&self) -> TrackerResult<Vec<BoardList>> {
        let mut state = self.state.lock().await;
        let cached = self.refresh_if_stale(&mut state).await?;
        Ok(cached.lists.clone())
    }

    /// Exact-name lookup without creating anything.
    ///
    /// Lookup failures are logged and reported as "no such list".
    pub async fn find(&self, name: &str) -> Option<BoardList> {
        let mut state = self.state.lock().await;
        match self.refresh_if_stale(&mut state).await {
            Ok(cached) => cached.lists.iter().find(|list| list.name == name).cloned(),
            Err(e) => {
                tracing::warn!(list = name, error = %e, "Failed to load board lists");
                None
            }
        }
    }

    /// Resolve the list named `name`, creating it at the end of the board if
    /// absent.
    ///
    /// Returns `None` when the lists cannot be loaded or the list cannot be
    /// created; callers skip the label for now.
    pub async fn resolve_or_create(&self, name: &str) -> Option<BoardList> {
        let mut state = self.state.lock().await;
        let cached = match self.refresh_if_stale(&mut state).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(list = name, error = %e, "Failed to load board lists");
                return None;
            }
        };

        if let Some(list) = cached.lists.iter().find(|list| list.name == name) {
            return Some(list.clone());
        }

        match self.tracker.create_list(&self.board_id, name).await {
            Ok(list) => {
                tracing::info!(list_id = %list.id, list = name, "Created mirror list");
                cached.lists.push(list.clone());
                Some(list)
            }
            Err(e) => {
                tracing::error!(list = name, error = %e, "Failed to create mirror list");
                None
            }
        }
    }

    /// Drop the cached list set so the next lookup re-fetches.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}
