//! Mirror synchronization core
//!
//! This module keeps one mirror card per label for every card on the master
//! list. It contains the label-to-list resolver, the mirror locator, the
//! duplicate-create suppressor and the reconciliation engine that ties them
//! together.

pub mod backref;
pub mod card_locks;
pub mod clock;
pub mod engine;
pub mod list_cache;
pub mod locator;
pub mod suppressor;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EngineConfig, MirrorEngine, MirrorEvent, ResyncOutcome, SyncAction, SyncResult, SyncSummary,
};
pub use list_cache::ListCache;
pub use locator::{MirrorCard, MirrorLocator};
pub use suppressor::DuplicateSuppressor;
