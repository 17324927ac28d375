//! Scripted in-memory events API for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ApiError, ApiResult, EventSnapshot, EventsApi, InterestStatus, ViewStatus};
use crate::models::{EventId, InterestAction};

#[derive(Debug, Default)]
struct ServerState {
    interested: HashSet<EventId>,
    interest_counts: HashMap<EventId, u64>,
    view_counts: HashMap<EventId, u64>,
    deleted: HashSet<EventId>,
    failing: HashMap<EventId, ApiError>,
    calls: Vec<(&'static str, EventId)>,
}

/// Fake backend holding per-event counters
///
/// Events exist unless marked deleted. Failures can be injected per event.
#[derive(Debug, Default)]
pub struct MockApi {
    state: Mutex<ServerState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn set_interest_count(&self, event_id: EventId, count: u64) {
        self.with_state(|s| s.interest_counts.insert(event_id, count));
    }

    pub fn set_view_count(&self, event_id: EventId, count: u64) {
        self.with_state(|s| s.view_counts.insert(event_id, count));
    }

    pub fn set_interested(&self, event_id: EventId) {
        self.with_state(|s| s.interested.insert(event_id));
    }

    pub fn delete(&self, event_id: EventId) {
        self.with_state(|s| s.deleted.insert(event_id));
    }

    /// Make every write for the event fail with `error`
    pub fn fail_writes(&self, event_id: EventId, error: ApiError) {
        self.with_state(|s| s.failing.insert(event_id, error));
    }

    pub fn heal(&self, event_id: EventId) {
        self.with_state(|s| s.failing.remove(&event_id));
    }

    /// Total calls made so far
    pub fn call_count(&self) -> usize {
        self.with_state(|s| s.calls.len())
    }

    /// Calls to one endpoint, by name
    pub fn calls_to(&self, endpoint: &str) -> Vec<EventId> {
        self.with_state(|s| {
            s.calls
                .iter()
                .filter(|(name, _)| *name == endpoint)
                .map(|(_, id)| *id)
                .collect()
        })
    }

    fn record(&self, endpoint: &'static str, event_id: EventId) -> ApiResult<()> {
        self.with_state(|s| {
            s.calls.push((endpoint, event_id));
            if s.deleted.contains(&event_id) {
                return Err(ApiError::NotFound);
            }
            Ok(())
        })
    }

    fn check_failure(&self, event_id: EventId) -> ApiResult<()> {
        self.with_state(|s| match s.failing.get(&event_id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        })
    }
}

#[async_trait]
impl EventsApi for MockApi {
    async fn get_event(&self, event_id: EventId) -> ApiResult<EventSnapshot> {
        self.record("get_event", event_id)?;
        Ok(self.with_state(|s| EventSnapshot {
            id: event_id,
            interest_count: s.interest_counts.get(&event_id).copied().unwrap_or(0),
            view_count: s.view_counts.get(&event_id).copied().unwrap_or(0),
        }))
    }

    async fn get_interest(&self, event_id: EventId) -> ApiResult<InterestStatus> {
        self.record("get_interest", event_id)?;
        Ok(self.with_state(|s| InterestStatus {
            interested: s.interested.contains(&event_id),
            interest_count: s.interest_counts.get(&event_id).copied().unwrap_or(0),
        }))
    }

    async fn apply_interest(
        &self,
        event_id: EventId,
        action: InterestAction,
    ) -> ApiResult<InterestStatus> {
        self.record("apply_interest", event_id)?;
        self.check_failure(event_id)?;
        Ok(self.with_state(|s| {
            let count = s.interest_counts.entry(event_id).or_insert(0);
            match action {
                InterestAction::Add => {
                    if s.interested.insert(event_id) {
                        *count += 1;
                    }
                }
                InterestAction::Remove => {
                    if s.interested.remove(&event_id) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            InterestStatus {
                interested: s.interested.contains(&event_id),
                interest_count: *count,
            }
        }))
    }

    async fn record_view(&self, event_id: EventId) -> ApiResult<ViewStatus> {
        self.record("record_view", event_id)?;
        self.check_failure(event_id)?;
        Ok(self.with_state(|s| {
            let count = s.view_counts.entry(event_id).or_insert(0);
            *count += 1;
            ViewStatus {
                view_count: *count,
                view_tracked: true,
            }
        }))
    }
}
