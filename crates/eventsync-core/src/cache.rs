//! Local interaction cache
//!
//! Holds one [`EventInteractionState`] per event, created on first access.
//! Server snapshots are merged with a last-writer-wins rule keyed on the
//! time of the last optimistic update.

use std::collections::{BTreeMap, HashSet};

use crate::models::{EventId, EventInteractionState, ServerSnapshot};

/// Per-event state store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCache {
    entries: BTreeMap<EventId, EventInteractionState>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from previously persisted entries
    pub fn from_entries(entries: BTreeMap<EventId, EventInteractionState>) -> Self {
        Self { entries }
    }

    /// Get the state for an event, inserting a zeroed default if absent
    pub fn get_or_create(&mut self, event_id: EventId) -> &mut EventInteractionState {
        self.entries.entry(event_id).or_default()
    }

    /// Get the state for an event without inserting
    pub fn get(&self, event_id: EventId) -> Option<&EventInteractionState> {
        self.entries.get(&event_id)
    }

    pub fn contains(&self, event_id: EventId) -> bool {
        self.entries.contains_key(&event_id)
    }

    pub fn remove(&mut self, event_id: EventId) -> Option<EventInteractionState> {
        self.entries.remove(&event_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<EventId, EventInteractionState> {
        &self.entries
    }

    /// Merge an authoritative server snapshot into the cache
    ///
    /// The snapshot wins when the entry has never been updated optimistically
    /// or when it was read after the last optimistic update. Otherwise the
    /// local values are kept. Returns whether the snapshot was applied.
    pub fn update_cache(&mut self, event_id: EventId, snapshot: &ServerSnapshot) -> bool {
        let entry = self.get_or_create(event_id);

        let accept = match entry.last_optimistic_update {
            None => true,
            Some(local) => snapshot.last_sync > local,
        };

        if !accept {
            return false;
        }

        if let Some(interested) = snapshot.interested {
            entry.interested = interested;
        }
        if let Some(count) = snapshot.interest_count {
            entry.interest_count = count;
        }
        if let Some(count) = snapshot.view_count {
            entry.view_count = count;
        }
        entry.last_sync = Some(snapshot.last_sync);
        true
    }

    /// Drop entries idle since before `cutoff`, except those listed in `keep`
    ///
    /// Entries with no recorded activity are treated as stale.
    pub fn evict_stale(&mut self, cutoff: i64, keep: &HashSet<EventId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, state| {
            keep.contains(id) || state.last_activity().is_some_and(|at| at >= cutoff)
        });
        before - self.entries.len()
    }
}
