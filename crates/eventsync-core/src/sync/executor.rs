//! Sync executor
//!
//! Drains the pending queues against the events API. Each queued view and
//! each queued interest change becomes its own future; all of them run
//! concurrently and complete independently, so one failing event never
//! blocks or aborts its siblings.
//!
//! Per item:
//! 1. Probe `GET /events/{id}`; not-found purges the event.
//! 2. Send the write (record view / apply interest).
//! 3. On success, dequeue and reconcile the cache with the server's counts.
//! 4. On failure, purge if not-found, otherwise back off or drop.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiResult};
use crate::engine::SyncEngine;
use crate::models::{
    now_millis, EventId, EventInteractionState, PendingInterestChange, ServerSnapshot,
};
use crate::queue::RetryDecision;

/// One unit of queued work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncItem {
    View(EventId),
    Interest(PendingInterestChange),
}

impl SyncItem {
    pub fn event_id(&self) -> EventId {
        match self {
            SyncItem::View(id) => *id,
            SyncItem::Interest(change) => change.event_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SyncItem::View(_) => "view",
            SyncItem::Interest(_) => "interest",
        }
    }
}

/// How a single item ended this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Confirmed by the server and dequeued
    Synced,
    /// Failed; kept with a later retry time
    Retrying,
    /// Failed too many times; discarded
    Dropped,
    /// The event no longer exists; all local traces removed
    Purged,
    /// A newer local change replaced the item while it was in flight
    Superseded,
}

/// Tally of one sync cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub retrying: usize,
    pub dropped: usize,
    pub purged: usize,
    pub superseded: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Synced => self.synced += 1,
            SyncOutcome::Retrying => self.retrying += 1,
            SyncOutcome::Dropped => self.dropped += 1,
            SyncOutcome::Purged => self.purged += 1,
            SyncOutcome::Superseded => self.superseded += 1,
        }
    }

    /// Number of items attempted
    pub fn attempted(&self) -> usize {
        self.synced + self.retrying + self.dropped + self.purged + self.superseded
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

/// Marks a cycle as running; cleared on drop so a cancelled cycle does not
/// block later ones
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    /// Run one sync cycle over every due queue entry
    ///
    /// Does nothing while offline or while another cycle is running. Items
    /// still backing off are skipped until their retry time.
    pub async fn sync_now(&self) -> SyncReport {
        if !self.is_online() {
            debug!("Offline, skipping sync");
            return SyncReport::default();
        }

        let Some(_running) = CycleGuard::acquire(&self.syncing) else {
            debug!("Sync already in progress");
            return SyncReport::default();
        };

        let items = {
            let now = now_millis();
            let state = self.lock();
            let views = state.queues.due_views(now).into_iter().map(SyncItem::View);
            let interests = state
                .queues
                .due_interests(now)
                .into_iter()
                .map(SyncItem::Interest);
            views.chain(interests).collect::<Vec<_>>()
        };

        let mut report = SyncReport::default();
        if !items.is_empty() {
            debug!("Syncing {} pending items", items.len());
            let outcomes = join_all(items.into_iter().map(|item| self.sync_item(item))).await;
            for outcome in outcomes {
                report.record(outcome);
            }
            info!(
                "Sync cycle: {} synced, {} retrying, {} dropped, {} purged",
                report.synced, report.retrying, report.dropped, report.purged
            );
        }

        report
    }

    /// Sync a single queued item end to end
    pub async fn sync_item(&self, item: SyncItem) -> SyncOutcome {
        let event_id = item.event_id();
        let issued_at = self.stamp();

        let result = match self.api.get_event(event_id).await {
            Ok(_) => self.write(&item).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => {
                let snapshot = ServerSnapshot {
                    last_sync: issued_at,
                    ..snapshot
                };
                self.complete(&item, snapshot)
            }
            Err(e) => self.fail(&item, e),
        }
    }

    async fn write(&self, item: &SyncItem) -> ApiResult<ServerSnapshot> {
        match item {
            SyncItem::View(id) => {
                let status = self.api.record_view(*id).await?;
                Ok(ServerSnapshot {
                    view_count: Some(status.view_count),
                    ..Default::default()
                })
            }
            SyncItem::Interest(change) => {
                let status = self.api.apply_interest(change.event_id, change.action).await?;
                Ok(ServerSnapshot {
                    interested: Some(status.interested),
                    interest_count: Some(status.interest_count),
                    ..Default::default()
                })
            }
        }
    }

    fn complete(&self, item: &SyncItem, snapshot: ServerSnapshot) -> SyncOutcome {
        let event_id = item.event_id();
        let mut state = self.lock();

        let dequeued = match item {
            SyncItem::View(id) => state.queues.complete_view(*id),
            SyncItem::Interest(change) => state
                .queues
                .complete_interest(change.event_id, change.timestamp),
        };

        // A superseded item leaves the newer local intent in charge, and a
        // purge that raced this call leaves nothing to reconcile
        if dequeued && state.cache.contains(event_id) {
            state.cache.update_cache(event_id, &snapshot);
            if let SyncItem::Interest(_) = item {
                state.settled.insert(event_id);
            }
        }
        self.persist_locked(&state);

        if dequeued {
            debug!("Synced {} for event {}", item.kind(), event_id);
            SyncOutcome::Synced
        } else {
            debug!(
                "Synced {} for event {}, newer local change still pending",
                item.kind(),
                event_id
            );
            SyncOutcome::Superseded
        }
    }

    fn fail(&self, item: &SyncItem, error: ApiError) -> SyncOutcome {
        let event_id = item.event_id();

        if error.is_not_found() {
            info!("Event {} no longer exists on the server", event_id);
            self.purge(event_id);
            return SyncOutcome::Purged;
        }

        let now = now_millis();
        let mut state = self.lock();
        let decision = match item {
            SyncItem::View(id) => state.queues.record_view_failure(*id, now, &self.policy),
            SyncItem::Interest(change) => state.queues.record_interest_failure(
                change.event_id,
                change.timestamp,
                now,
                &self.policy,
            ),
        };
        // A discarded intent leaves the local value as the settled one
        if let (SyncItem::Interest(_), Some(RetryDecision::Drop)) = (item, &decision) {
            state.settled.insert(event_id);
        }
        self.persist_locked(&state);

        match decision {
            Some(RetryDecision::Retry { at }) => {
                debug!(
                    "Sync of {} for event {} failed ({}), retrying in {}ms",
                    item.kind(),
                    event_id,
                    error,
                    at - now
                );
                SyncOutcome::Retrying
            }
            Some(RetryDecision::Drop) => {
                warn!(
                    "Dropping pending {} for event {} after {} attempts: {}",
                    item.kind(),
                    event_id,
                    self.policy.max_retries,
                    error
                );
                SyncOutcome::Dropped
            }
            None => SyncOutcome::Superseded,
        }
    }

    /// Reconcile an event's counts with `GET /events/{id}`
    ///
    /// A not-found response purges the event.
    pub async fn refresh_event(&self, event_id: EventId) -> ApiResult<EventInteractionState> {
        if !self.is_online() {
            return Err(ApiError::Offline);
        }

        let issued_at = self.stamp();
        let event = match self.api.get_event(event_id).await {
            Ok(event) => event,
            Err(e) => {
                if e.is_not_found() {
                    self.purge(event_id);
                }
                return Err(e);
            }
        };

        let mut state = self.lock();
        // A pending toggle already counts the caller; the server count does not yet
        let interest_count = if state.queues.interest(event_id).is_some() {
            None
        } else {
            Some(event.interest_count)
        };
        state.cache.update_cache(
            event_id,
            &ServerSnapshot {
                interested: None,
                interest_count,
                view_count: Some(event.view_count),
                last_sync: issued_at,
            },
        );
        self.persist_locked(&state);
        Ok(state.cache.get_or_create(event_id).clone())
    }

    /// Fetch the caller's interest status once and mark it checked
    ///
    /// Skips the network while a local change is pending, since the pending
    /// intent is what the user last expressed.
    pub async fn refresh_interest_status(
        &self,
        event_id: EventId,
    ) -> ApiResult<EventInteractionState> {
        {
            let mut state = self.lock();
            if state.queues.interest(event_id).is_some() {
                return Ok(state.cache.get_or_create(event_id).clone());
            }
        }

        if !self.is_online() {
            return Err(ApiError::Offline);
        }

        let issued_at = self.stamp();
        let status = match self.api.get_interest(event_id).await {
            Ok(status) => status,
            Err(e) => {
                if e.is_not_found() {
                    self.purge(event_id);
                }
                return Err(e);
            }
        };

        let mut state = self.lock();
        state.cache.update_cache(
            event_id,
            &ServerSnapshot {
                interested: Some(status.interested),
                interest_count: Some(status.interest_count),
                view_count: None,
                last_sync: issued_at,
            },
        );
        let entry = state.cache.get_or_create(event_id);
        entry.interest_status_checked = true;
        let result = entry.clone();
        state.settled.insert(event_id);
        self.persist_locked(&state);
        Ok(result)
    }
}
