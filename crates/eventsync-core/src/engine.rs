//! Optimistic interaction engine
//!
//! [`SyncEngine`] owns the local cache and the pending-change queues. User
//! actions (`toggle_interest`, `track_view`) update both synchronously and
//! return immediately; the network is only touched later by the sync
//! executor (see [`crate::sync`]).
//!
//! The engine is an explicitly constructed service: the application calls
//! [`SyncEngine::init`] once at startup, which restores persisted state
//! before any action can reach it, and [`SyncEngine::dispose`] on shutdown.
//!
//! All state lives behind one mutex that is never held across an await, so
//! concurrent sync tasks only ever interleave between network calls.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::{EventsApi, HttpEventsApi};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::models::{
    now_millis, EngineStatus, EventId, EventInteractionState, InterestAction, InterestToggle,
    ViewTracking,
};
use crate::queue::{PendingQueues, RetryPolicy};
use crate::storage::{FileStore, KeyValueStore, PersistedState};

/// Interest lifecycle of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestPhase {
    /// No server truth and no pending change
    Unknown,
    /// An `add` is waiting for the server
    PendingAdd,
    /// A `remove` is waiting for the server
    PendingRemove,
    /// Local state reflects the server
    Synced,
    /// The event was deleted server-side and all local traces removed
    Purged,
}

/// Result of a housekeeping sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted_cache_entries: usize,
    pub evicted_queue_entries: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.evicted_cache_entries == 0 && self.evicted_queue_entries == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) cache: LocalCache,
    pub(crate) queues: PendingQueues,
    /// Events purged since the last cleanup
    pub(crate) purged: HashSet<EventId>,
    /// Events whose last interest intent was confirmed or discarded
    pub(crate) settled: HashSet<EventId>,
}

/// Optimistic interest and view tracking with background sync
pub struct SyncEngine {
    state: Mutex<EngineState>,
    store: Arc<dyn KeyValueStore>,
    pub(crate) api: Arc<dyn EventsApi>,
    pub(crate) policy: RetryPolicy,
    online: AtomicBool,
    pub(crate) syncing: AtomicBool,
    disposed: AtomicBool,
    last_stamp: AtomicI64,
}

impl SyncEngine {
    /// Create the engine and restore persisted state
    ///
    /// A missing slot starts empty. An unreadable or corrupt slot is logged
    /// and the engine starts empty; the next write replaces it.
    pub fn init(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn EventsApi>,
        policy: RetryPolicy,
    ) -> Arc<Self> {
        let (cache, queues) = match PersistedState::load(store.as_ref()) {
            Ok(Some(persisted)) => {
                debug!(
                    "Restored {} cached events, {} pending views, {} pending interests",
                    persisted.local_cache.len(),
                    persisted.view_queue.len(),
                    persisted.interest_queue.len()
                );
                persisted.restore()
            }
            Ok(None) => (LocalCache::new(), PendingQueues::new()),
            Err(e) => {
                warn!("Failed to restore interaction state, starting empty: {}", e);
                (LocalCache::new(), PendingQueues::new())
            }
        };

        let latest = latest_timestamp(&cache, &queues);
        let settled = cache
            .entries()
            .iter()
            .filter(|(id, entry)| {
                (entry.last_sync.is_some() || entry.interest_status_checked)
                    && queues.interest(**id).is_none()
            })
            .map(|(id, _)| *id)
            .collect();

        Arc::new(Self {
            state: Mutex::new(EngineState {
                cache,
                queues,
                purged: HashSet::new(),
                settled,
            }),
            store,
            api,
            policy,
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            last_stamp: AtomicI64::new(latest),
        })
    }

    /// Create an engine backed by the data directory and the HTTP API
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        let store = FileStore::new(&config.data_dir)
            .with_context(|| format!("Failed to open state store in {:?}", config.data_dir))?;
        let api = HttpEventsApi::from_config(config).context("Failed to create API client")?;
        Ok(Self::init(
            Arc::new(store),
            Arc::new(api),
            config.retry_policy(),
        ))
    }

    /// Flush state and mark the engine as shut down
    ///
    /// In-flight network calls are not cancelled; their results are still
    /// applied if they complete.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.persist();
        debug!("Sync engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Strictly increasing millisecond timestamp
    pub(crate) fn stamp(&self) -> i64 {
        let now = now_millis();
        let prev = match self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev + 1)
    }

    /// Optimistically flip interest for an event
    ///
    /// Updates the cache, replaces any pending change for the event with the
    /// new net intent, persists, and returns without touching the network.
    pub fn toggle_interest(&self, event_id: EventId) -> InterestToggle {
        let now = self.stamp();
        let mut state = self.lock();
        state.purged.remove(&event_id);

        let entry = state.cache.get_or_create(event_id);
        let interested = !entry.interested;
        entry.interested = interested;
        entry.interest_count = if interested {
            entry.interest_count + 1
        } else {
            entry.interest_count.saturating_sub(1)
        };
        entry.last_optimistic_update = Some(now);
        let interest_count = entry.interest_count;

        let action = InterestAction::for_state(interested);
        state.queues.queue_interest(event_id, action, now);
        debug!("Queued interest {} for event {}", action, event_id);

        self.persist_locked(&state);

        InterestToggle {
            interested,
            interest_count,
            is_optimistic: true,
        }
    }

    /// Optimistically count a view, at most once per event
    ///
    /// Repeated calls return the current state and queue nothing.
    pub fn track_view(&self, event_id: EventId) -> ViewTracking {
        let now = self.stamp();
        let mut state = self.lock();
        state.purged.remove(&event_id);

        let entry = state.cache.get_or_create(event_id);
        if entry.view_tracked {
            let view_count = entry.view_count;
            return ViewTracking {
                view_count,
                view_tracked: true,
                is_optimistic: state.queues.views().contains(&event_id),
            };
        }

        entry.view_count += 1;
        entry.view_tracked = true;
        entry.last_optimistic_update = Some(now);
        let view_count = entry.view_count;

        state.queues.queue_view(event_id);
        debug!("Queued view for event {}", event_id);

        self.persist_locked(&state);

        ViewTracking {
            view_count,
            view_tracked: true,
            is_optimistic: true,
        }
    }

    /// Current local state for an event, creating it if absent
    pub fn state(&self, event_id: EventId) -> EventInteractionState {
        self.lock().cache.get_or_create(event_id).clone()
    }

    /// Current local state for an event without creating it
    pub fn peek(&self, event_id: EventId) -> Option<EventInteractionState> {
        self.lock().cache.get(event_id).cloned()
    }

    /// Where the event's interest sits in its sync lifecycle
    pub fn interest_phase(&self, event_id: EventId) -> InterestPhase {
        let state = self.lock();
        if let Some(change) = state.queues.interest(event_id) {
            return match change.action {
                InterestAction::Add => InterestPhase::PendingAdd,
                InterestAction::Remove => InterestPhase::PendingRemove,
            };
        }
        if state.purged.contains(&event_id) {
            InterestPhase::Purged
        } else if state.settled.contains(&event_id) {
            InterestPhase::Synced
        } else {
            InterestPhase::Unknown
        }
    }

    /// Debug and introspection snapshot
    pub fn status(&self) -> EngineStatus {
        let state = self.lock();
        EngineStatus {
            online: self.is_online(),
            pending_views: state.queues.pending_views(),
            pending_interests: state.queues.pending_interests(),
            cached_events: state.cache.len(),
            has_pending_changes: !state.queues.is_empty(),
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.lock().queues.is_empty()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record connectivity; returns the previous value
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        previous
    }

    /// Remove every local trace of a deleted event
    pub fn purge(&self, event_id: EventId) {
        let mut state = self.lock();
        let had_entry = state.cache.remove(event_id).is_some();
        let had_pending = state.queues.remove_all(event_id);
        state.settled.remove(&event_id);
        state.purged.insert(event_id);
        self.persist_locked(&state);
        info!(
            "Purged event {} (cached: {}, pending: {})",
            event_id, had_entry, had_pending
        );
    }

    /// Evict idle cache entries and long-failing queue entries
    ///
    /// Queue entries that never failed are kept, and cache entries with
    /// pending work are never evicted.
    /// Purge markers are forgotten, so a purged event reads as
    /// [`InterestPhase::Unknown`] afterwards.
    pub fn cleanup(&self, max_age: Duration) -> CleanupReport {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(max_age_ms);
        let mut state = self.lock();

        let evicted_queue = state.queues.evict_failed(cutoff);
        let keep: HashSet<EventId> = state.queues.pending_ids().collect();
        let evicted_cache = state.cache.evict_stale(cutoff, &keep);

        let EngineState {
            cache,
            settled,
            purged,
            ..
        } = &mut *state;
        settled.retain(|id| cache.contains(*id));
        purged.clear();

        let report = CleanupReport {
            evicted_cache_entries: evicted_cache,
            evicted_queue_entries: evicted_queue.len(),
        };

        if !report.is_empty() {
            self.persist_locked(&state);
            info!(
                "Cleanup evicted {} cache entries and {} failed queue entries",
                report.evicted_cache_entries, report.evicted_queue_entries
            );
            for id in evicted_queue {
                warn!(
                    "Discarded pending change for event {} after failing for {:?}",
                    id, max_age
                );
            }
        }

        report
    }

    /// Write the full state to the durable slot
    pub fn persist(&self) {
        let state = self.lock();
        self.persist_locked(&state);
    }

    /// Persist while the caller already holds the state lock
    ///
    /// Failures are logged; the engine keeps running from memory.
    pub(crate) fn persist_locked(&self, state: &EngineState) {
        let snapshot = PersistedState::capture(&state.cache, &state.queues, now_millis());
        if let Err(e) = snapshot.save(self.store.as_ref()) {
            warn!("Failed to persist interaction state: {}", e);
        }
    }
}

fn latest_timestamp(cache: &LocalCache, queues: &PendingQueues) -> i64 {
    let cached = cache
        .entries()
        .values()
        .filter_map(|entry| entry.last_activity());
    let queued = queues.interests().values().map(|change| change.timestamp);
    cached.chain(queued).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::storage::{MemoryStore, StorageError, StorageResult, STATE_KEY};
    use tempfile::TempDir;

    fn engine_with(store: MemoryStore) -> Arc<SyncEngine> {
        SyncEngine::init(
            Arc::new(store),
            Arc::new(MockApi::new()),
            RetryPolicy::default(),
        )
    }

    fn persisted(store: &MemoryStore) -> PersistedState {
        PersistedState::load(store).unwrap().unwrap()
    }

    #[test]
    fn test_toggle_from_known_state() {
        let store = MemoryStore::new();
        let engine = engine_with(store.clone());
        engine.lock().cache.get_or_create(42).interest_count = 3;

        let result = engine.toggle_interest(42);

        assert_eq!(
            result,
            InterestToggle {
                interested: true,
                interest_count: 4,
                is_optimistic: true
            }
        );
        let saved = persisted(&store);
        assert_eq!(saved.interest_queue.len(), 1);
        assert_eq!(saved.interest_queue[&42].action, InterestAction::Add);
        assert_eq!(saved.local_cache[&42].interest_count, 4);
        assert_eq!(engine.interest_phase(42), InterestPhase::PendingAdd);
    }

    #[test]
    fn test_rapid_toggles_coalesce() {
        let engine = engine_with(MemoryStore::new());

        let mut last = engine.toggle_interest(9);
        for _ in 0..6 {
            last = engine.toggle_interest(9);
            assert!(engine.status().pending_interests <= 1);
        }

        // Seven toggles from not-interested end interested with one net add
        assert!(last.interested);
        assert_eq!(last.interest_count, 1);
        let status = engine.status();
        assert_eq!(status.pending_interests, 1);
        assert_eq!(engine.interest_phase(9), InterestPhase::PendingAdd);

        let last = engine.toggle_interest(9);
        assert!(!last.interested);
        assert_eq!(last.interest_count, 0);
        assert_eq!(engine.interest_phase(9), InterestPhase::PendingRemove);
    }

    #[test]
    fn test_toggle_clamps_count_at_zero() {
        let engine = engine_with(MemoryStore::new());
        engine.lock().cache.get_or_create(3).interested = true;

        let result = engine.toggle_interest(3);
        assert!(!result.interested);
        assert_eq!(result.interest_count, 0);
    }

    #[test]
    fn test_track_view_is_idempotent() {
        let store = MemoryStore::new();
        let engine = engine_with(store.clone());
        engine.lock().cache.get_or_create(5).view_count = 10;

        let first = engine.track_view(5);
        let second = engine.track_view(5);

        assert_eq!(first.view_count, 11);
        assert!(first.is_optimistic);
        assert_eq!(second.view_count, 11);
        assert!(second.view_tracked);
        assert_eq!(engine.status().pending_views, 1);
        assert_eq!(persisted(&store).view_queue.len(), 1);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let engine = engine_with(MemoryStore::new());
        let stamps: Vec<i64> = (0..100).map(|_| engine.stamp()).collect();
        assert!(stamps.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_state_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(temp_dir.path()).unwrap());

        {
            let engine = SyncEngine::init(
                store.clone(),
                Arc::new(MockApi::new()),
                RetryPolicy::default(),
            );
            engine.toggle_interest(42);
            engine.track_view(42);
            engine.dispose();
        }

        let engine = SyncEngine::init(store, Arc::new(MockApi::new()), RetryPolicy::default());
        let status = engine.status();
        assert_eq!(status.pending_interests, 1);
        assert_eq!(status.pending_views, 1);
        assert!(status.has_pending_changes);

        let state = engine.state(42);
        assert!(state.interested);
        assert_eq!(state.interest_count, 1);
        assert!(state.view_tracked);

        // The restored view is still deduplicated
        assert_eq!(engine.track_view(42).view_count, 1);

        // New stamps keep increasing past the restored ones
        let restored = state.last_optimistic_update.unwrap();
        assert!(engine.stamp() > restored);
    }

    #[test]
    fn test_corrupt_slot_starts_empty() {
        let store = MemoryStore::new();
        store.set(STATE_KEY, "{broken").unwrap();

        let engine = engine_with(store.clone());
        assert_eq!(engine.status().cached_events, 0);

        // The next write replaces the corrupt slot
        engine.toggle_interest(1);
        assert_eq!(persisted(&store).interest_queue.len(), 1);
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::InvalidKey("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::InvalidKey("unavailable".to_string()))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_storage_failures_fall_back_to_memory() {
        let engine = SyncEngine::init(
            Arc::new(FailingStore),
            Arc::new(MockApi::new()),
            RetryPolicy::default(),
        );

        let result = engine.toggle_interest(8);
        assert!(result.interested);
        assert_eq!(engine.status().pending_interests, 1);
    }

    #[test]
    fn test_purge_removes_everything() {
        let store = MemoryStore::new();
        let engine = engine_with(store.clone());
        engine.toggle_interest(77);
        engine.track_view(77);

        engine.purge(77);

        assert!(engine.peek(77).is_none());
        assert_eq!(engine.status().pending_interests, 0);
        assert_eq!(engine.status().pending_views, 0);
        assert_eq!(engine.interest_phase(77), InterestPhase::Purged);

        let saved = persisted(&store);
        assert!(!saved.local_cache.contains_key(&77));
        assert!(!saved.interest_queue.contains_key(&77));
        assert!(!saved.view_queue.contains(&77));
    }

    #[test]
    fn test_cleanup_evicts_idle_entries_only() {
        let engine = engine_with(MemoryStore::new());
        let day_ago = now_millis() - 25 * 3600 * 1000;
        {
            let mut state = engine.lock();
            state.cache.get_or_create(1).last_sync = Some(day_ago);
            state.cache.get_or_create(2).last_sync = Some(day_ago);
            state.queues.queue_view(2);
        }
        engine.track_view(3);

        let report = engine.cleanup(Duration::from_secs(24 * 3600));

        assert_eq!(report.evicted_cache_entries, 1);
        assert_eq!(report.evicted_queue_entries, 0);
        assert!(engine.peek(1).is_none());
        assert!(engine.peek(2).is_some());
        assert!(engine.peek(3).is_some());
    }

    #[test]
    fn test_cleanup_forgets_purge_markers() {
        let engine = engine_with(MemoryStore::new());
        engine.toggle_interest(77);
        engine.purge(77);
        assert_eq!(engine.interest_phase(77), InterestPhase::Purged);

        engine.cleanup(Duration::from_secs(24 * 3600));

        assert!(engine.lock().purged.is_empty());
        assert_eq!(engine.interest_phase(77), InterestPhase::Unknown);
    }

    #[test]
    fn test_cleanup_drops_settled_marks_for_evicted_entries() {
        let engine = engine_with(MemoryStore::new());
        {
            let mut state = engine.lock();
            state.cache.get_or_create(4).last_sync = Some(now_millis() - 25 * 3600 * 1000);
            state.settled.insert(4);
        }

        engine.cleanup(Duration::from_secs(24 * 3600));

        assert!(engine.peek(4).is_none());
        assert!(!engine.lock().settled.contains(&4));
    }

    #[test]
    fn test_restored_synced_entries_are_settled() {
        let store = MemoryStore::new();
        {
            let engine = engine_with(store.clone());
            let mut state = engine.lock();
            state.cache.get_or_create(30).last_sync = Some(now_millis());
            state.cache.get_or_create(31).last_sync = Some(now_millis());
            state.cache.get_or_create(32);
            drop(state);
            engine.persist();
            engine.toggle_interest(31);
        }

        let engine = engine_with(store);
        assert_eq!(engine.interest_phase(30), InterestPhase::Synced);
        assert_eq!(engine.interest_phase(31), InterestPhase::PendingAdd);
        assert_eq!(engine.interest_phase(32), InterestPhase::Unknown);
    }

    #[test]
    fn test_set_online_returns_previous() {
        let engine = engine_with(MemoryStore::new());
        assert!(engine.is_online());
        assert!(engine.set_online(false));
        assert!(!engine.set_online(true));
        assert!(engine.status().online);
    }
}
