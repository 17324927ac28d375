//! Data models for event interaction state
//!
//! These types are persisted as JSON and returned to callers of the engine.
//! Field names on the persisted types follow the stored layout, which mixes
//! camelCase flags with the snake_case counters the API reports.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier of an event entity on the server
pub type EventId = i64;

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local interaction state for one event
///
/// Created lazily on first read or write with everything zeroed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInteractionState {
    pub interested: bool,
    pub interest_count: u64,
    pub view_count: u64,
    /// Set once a view has been counted for this event
    #[serde(rename = "viewTracked")]
    pub view_tracked: bool,
    /// Whether server truth for `interested` has ever been fetched
    #[serde(rename = "interestStatusChecked")]
    pub interest_status_checked: bool,
    #[serde(rename = "lastSync", default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<i64>,
    #[serde(
        rename = "lastOptimisticUpdate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_optimistic_update: Option<i64>,
}

impl EventInteractionState {
    /// Most recent local or server activity on this entry
    pub fn last_activity(&self) -> Option<i64> {
        match (self.last_sync, self.last_optimistic_update) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Direction of a pending interest change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestAction {
    Add,
    Remove,
}

impl InterestAction {
    /// Action that moves an entity into the given interest state
    pub fn for_state(interested: bool) -> Self {
        if interested {
            InterestAction::Add
        } else {
            InterestAction::Remove
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InterestAction::Add => "add",
            InterestAction::Remove => "remove",
        }
    }
}

impl std::fmt::Display for InterestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interest change waiting for server confirmation
///
/// At most one exists per event; a newer toggle replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterestChange {
    /// Not stored inside the entry; the map key carries it
    #[serde(skip)]
    pub event_id: EventId,
    pub action: InterestAction,
    pub timestamp: i64,
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
    #[serde(
        rename = "nextRetryTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_retry_timestamp: Option<i64>,
}

impl PendingInterestChange {
    pub fn new(event_id: EventId, action: InterestAction, timestamp: i64) -> Self {
        Self {
            event_id,
            action,
            timestamp,
            retry_count: 0,
            next_retry_timestamp: None,
        }
    }

    /// Whether the entry may be attempted at `now`
    pub fn is_due(&self, now: i64) -> bool {
        self.next_retry_timestamp.map_or(true, |at| at <= now)
    }
}

/// Result of an optimistic interest toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterestToggle {
    pub interested: bool,
    pub interest_count: u64,
    #[serde(rename = "isOptimistic")]
    pub is_optimistic: bool,
}

/// Result of an optimistic view tracking call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewTracking {
    pub view_count: u64,
    #[serde(rename = "viewTracked")]
    pub view_tracked: bool,
    #[serde(rename = "isOptimistic")]
    pub is_optimistic: bool,
}

/// Authoritative values reported by the server
///
/// Fields left as `None` keep their cached value when the snapshot is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub interested: Option<bool>,
    pub interest_count: Option<u64>,
    pub view_count: Option<u64>,
    /// When the server state was read (request issue time)
    pub last_sync: i64,
}

/// Debug and introspection view of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub online: bool,
    #[serde(rename = "pendingViews")]
    pub pending_views: usize,
    #[serde(rename = "pendingInterests")]
    pub pending_interests: usize,
    #[serde(rename = "cachedEvents")]
    pub cached_events: usize,
    #[serde(rename = "hasPendingChanges")]
    pub has_pending_changes: bool,
}
