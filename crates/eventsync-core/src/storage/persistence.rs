//! Persisted interaction state
//!
//! The view queue, the interest-change map and the local cache are written
//! together as one JSON document under [`STATE_KEY`]:
//!
//! ```text
//! {
//!   "viewQueue": [eventId, ...],
//!   "interestQueue": { eventId: {action, timestamp, retryCount, nextRetryTimestamp?} },
//!   "localCache": { eventId: {interested, interest_count, view_count, viewTracked, ...} },
//!   "timestamp": <serialization time>
//! }
//! ```
//!
//! Ordered collections keep the encoding stable, so a round trip reproduces
//! the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::error::StorageResult;
use super::KeyValueStore;
use crate::cache::LocalCache;
use crate::models::{EventId, EventInteractionState, PendingInterestChange};
use crate::queue::PendingQueues;

/// Key of the durable slot holding the engine state
pub const STATE_KEY: &str = "event_interaction_state";

/// Serialized form of the engine state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "viewQueue", default)]
    pub view_queue: BTreeSet<EventId>,
    #[serde(rename = "interestQueue", default)]
    pub interest_queue: BTreeMap<EventId, PendingInterestChange>,
    #[serde(rename = "localCache", default)]
    pub local_cache: BTreeMap<EventId, EventInteractionState>,
    #[serde(default)]
    pub timestamp: i64,
}

impl PersistedState {
    /// Snapshot the in-memory structures
    pub fn capture(cache: &LocalCache, queues: &PendingQueues, timestamp: i64) -> Self {
        Self {
            view_queue: queues.views().clone(),
            interest_queue: queues.interests().clone(),
            local_cache: cache.entries().clone(),
            timestamp,
        }
    }

    /// Rebuild the in-memory structures
    pub fn restore(self) -> (LocalCache, PendingQueues) {
        let cache = LocalCache::from_entries(self.local_cache);
        let queues = PendingQueues::from_parts(self.view_queue, self.interest_queue);
        (cache, queues)
    }

    pub fn to_json(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> StorageResult<Self> {
        let mut state: PersistedState = serde_json::from_str(json)?;
        // The id lives in the map key only
        for (id, change) in state.interest_queue.iter_mut() {
            change.event_id = *id;
        }
        Ok(state)
    }

    /// Write the state to its slot
    pub fn save(&self, store: &dyn KeyValueStore) -> StorageResult<()> {
        store.set(STATE_KEY, &self.to_json()?)
    }

    /// Read the state from its slot; `None` if nothing was saved yet
    pub fn load(store: &dyn KeyValueStore) -> StorageResult<Option<Self>> {
        match store.get(STATE_KEY)? {
            Some(json) => Ok(Some(Self::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove the slot entirely
    pub fn clear(store: &dyn KeyValueStore) -> StorageResult<()> {
        store.remove(STATE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterestAction;
    use crate::storage::{FileStore, MemoryStore, StorageError};
    use tempfile::TempDir;

    fn sample_state() -> (LocalCache, PendingQueues) {
        let mut cache = LocalCache::new();
        {
            let state = cache.get_or_create(42);
            state.interested = true;
            state.interest_count = 4;
            state.last_optimistic_update = Some(1_700_000_000_000);
        }
        {
            let state = cache.get_or_create(7);
            state.view_count = 11;
            state.view_tracked = true;
            state.interest_status_checked = true;
            state.last_sync = Some(1_700_000_000_500);
        }

        let mut queues = PendingQueues::new();
        queues.queue_view(7);
        queues.queue_interest(42, InterestAction::Add, 1_700_000_000_000);
        queues.record_interest_failure(
            42,
            1_700_000_000_000,
            1_700_000_000_100,
            &Default::default(),
        );

        (cache, queues)
    }

    #[test]
    fn test_layout_field_names() {
        let (cache, queues) = sample_state();
        let state = PersistedState::capture(&cache, &queues, 99);

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["viewQueue"], serde_json::json!([7]));
        assert_eq!(json["interestQueue"]["42"]["action"], "add");
        assert_eq!(json["interestQueue"]["42"]["retryCount"], 1);
        assert!(json["interestQueue"]["42"]["nextRetryTimestamp"].is_i64());
        assert_eq!(json["localCache"]["42"]["interest_count"], 4);
        assert_eq!(json["localCache"]["7"]["viewTracked"], true);
        assert_eq!(json["timestamp"], 99);
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let (cache, queues) = sample_state();
        let state = PersistedState::capture(&cache, &queues, 99);
        let first = state.to_json().unwrap();

        let restored = PersistedState::from_json(&first).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.to_json().unwrap(), first);

        let (cache2, queues2) = restored.restore();
        assert_eq!(cache2, cache);
        assert_eq!(queues2.interests(), queues.interests());
        assert_eq!(queues2.views(), queues.views());
        assert_eq!(queues2.interest(42).unwrap().event_id, 42);
    }

    #[test]
    fn test_save_and_load_through_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();

        assert!(PersistedState::load(&store).unwrap().is_none());

        let (cache, queues) = sample_state();
        let state = PersistedState::capture(&cache, &queues, 5);
        state.save(&store).unwrap();

        let loaded = PersistedState::load(&store).unwrap().unwrap();
        assert_eq!(loaded, state);

        PersistedState::clear(&store).unwrap();
        assert!(PersistedState::load(&store).unwrap().is_none());
    }

    #[test]
    fn test_load_accepts_missing_sections() {
        let store = MemoryStore::new();
        store.set(STATE_KEY, r#"{"viewQueue":[3]}"#).unwrap();

        let loaded = PersistedState::load(&store).unwrap().unwrap();
        assert!(loaded.view_queue.contains(&3));
        assert!(loaded.interest_queue.is_empty());
        assert!(loaded.local_cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_slot() {
        let store = MemoryStore::new();
        store.set(STATE_KEY, "not json").unwrap();

        let err = PersistedState::load(&store).unwrap_err();
        assert!(matches!(err, StorageError::InvalidFormat(_)));
    }
}
