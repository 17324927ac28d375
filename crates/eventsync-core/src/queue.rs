//! Pending-change queues
//!
//! Two queues feed the sync executor:
//!
//! - **Views**: a set of event ids whose counted view still needs server
//!   confirmation. An id appears at most once.
//! - **Interests**: at most one [`PendingInterestChange`] per event. A new
//!   toggle replaces the previous entry, so rapid clicking collapses into a
//!   single net intent.
//!
//! Failed attempts are rescheduled with exponential backoff until the
//! [`RetryPolicy`] gives up.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{EventId, InterestAction, PendingInterestChange};

/// Backoff and attempt cap for failed syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an entry is dropped
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `retry_count` failures
    ///
    /// `base * 2^(retry_count - 1)`, saturating.
    pub fn delay_ms(&self, retry_count: u32) -> i64 {
        let exponent = retry_count.saturating_sub(1).min(30);
        self.base_delay_ms.saturating_mul(1_i64 << exponent)
    }

    /// Decide what to do with an entry that has now failed `retry_count` times
    pub fn decide(&self, retry_count: u32, now: i64) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::Retry {
                at: now.saturating_add(self.delay_ms(retry_count)),
            }
        } else {
            RetryDecision::Drop
        }
    }
}

/// Outcome of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the entry; skip it until `at`
    Retry { at: i64 },
    /// Give up on the entry
    Drop,
}

/// Retry bookkeeping for a queued view
///
/// Lives only in memory; the persisted view queue is a plain id list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ViewRetry {
    retry_count: u32,
    next_retry_timestamp: i64,
    first_failure: i64,
}

/// The view set and interest-change map
#[derive(Debug, Clone, Default)]
pub struct PendingQueues {
    views: BTreeSet<EventId>,
    interests: BTreeMap<EventId, PendingInterestChange>,
    view_retries: HashMap<EventId, ViewRetry>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild queues from persisted contents
    pub fn from_parts(
        views: BTreeSet<EventId>,
        interests: BTreeMap<EventId, PendingInterestChange>,
    ) -> Self {
        Self {
            views,
            interests,
            view_retries: HashMap::new(),
        }
    }

    pub fn views(&self) -> &BTreeSet<EventId> {
        &self.views
    }

    pub fn interests(&self) -> &BTreeMap<EventId, PendingInterestChange> {
        &self.interests
    }

    pub fn pending_views(&self) -> usize {
        self.views.len()
    }

    pub fn pending_interests(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.interests.is_empty()
    }

    /// Whether the event has any queued work
    pub fn has_pending(&self, event_id: EventId) -> bool {
        self.views.contains(&event_id) || self.interests.contains_key(&event_id)
    }

    /// Ids with any queued work
    pub fn pending_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.views
            .iter()
            .copied()
            .chain(self.interests.keys().copied())
    }

    /// Queue an interest change, replacing any earlier one for the event
    pub fn queue_interest(&mut self, event_id: EventId, action: InterestAction, now: i64) {
        self.interests
            .insert(event_id, PendingInterestChange::new(event_id, action, now));
    }

    /// Queue a view; returns false if the id was already queued
    pub fn queue_view(&mut self, event_id: EventId) -> bool {
        self.views.insert(event_id)
    }

    pub fn interest(&self, event_id: EventId) -> Option<&PendingInterestChange> {
        self.interests.get(&event_id)
    }

    /// Interest changes whose backoff has elapsed
    pub fn due_interests(&self, now: i64) -> Vec<PendingInterestChange> {
        self.interests
            .values()
            .filter(|change| change.is_due(now))
            .cloned()
            .collect()
    }

    /// Queued views whose backoff has elapsed
    pub fn due_views(&self, now: i64) -> Vec<EventId> {
        self.views
            .iter()
            .copied()
            .filter(|id| {
                self.view_retries
                    .get(id)
                    .map_or(true, |retry| retry.next_retry_timestamp <= now)
            })
            .collect()
    }

    /// Remove a confirmed interest change
    ///
    /// Only removes the entry if it is still the one that was sent; a toggle
    /// made while the request was in flight replaces it and must survive.
    pub fn complete_interest(&mut self, event_id: EventId, sent_timestamp: i64) -> bool {
        match self.interests.get(&event_id) {
            Some(change) if change.timestamp == sent_timestamp => {
                self.interests.remove(&event_id);
                true
            }
            _ => false,
        }
    }

    /// Remove a confirmed view
    pub fn complete_view(&mut self, event_id: EventId) -> bool {
        self.view_retries.remove(&event_id);
        self.views.remove(&event_id)
    }

    /// Record a failed interest sync and reschedule or drop it
    ///
    /// Returns `None` if the entry is gone or was superseded by a newer toggle.
    pub fn record_interest_failure(
        &mut self,
        event_id: EventId,
        sent_timestamp: i64,
        now: i64,
        policy: &RetryPolicy,
    ) -> Option<RetryDecision> {
        let change = self
            .interests
            .get_mut(&event_id)
            .filter(|change| change.timestamp == sent_timestamp)?;

        change.retry_count += 1;
        let decision = policy.decide(change.retry_count, now);
        match decision {
            RetryDecision::Retry { at } => change.next_retry_timestamp = Some(at),
            RetryDecision::Drop => {
                self.interests.remove(&event_id);
            }
        }
        Some(decision)
    }

    /// Record a failed view sync and reschedule or drop it
    pub fn record_view_failure(
        &mut self,
        event_id: EventId,
        now: i64,
        policy: &RetryPolicy,
    ) -> Option<RetryDecision> {
        if !self.views.contains(&event_id) {
            return None;
        }

        let retry = self.view_retries.entry(event_id).or_insert(ViewRetry {
            retry_count: 0,
            next_retry_timestamp: now,
            first_failure: now,
        });
        retry.retry_count += 1;

        let decision = policy.decide(retry.retry_count, now);
        match decision {
            RetryDecision::Retry { at } => retry.next_retry_timestamp = at,
            RetryDecision::Drop => {
                self.view_retries.remove(&event_id);
                self.views.remove(&event_id);
            }
        }
        Some(decision)
    }

    /// Retry count of a queued view (0 if it never failed)
    pub fn view_retry_count(&self, event_id: EventId) -> u32 {
        self.view_retries
            .get(&event_id)
            .map_or(0, |retry| retry.retry_count)
    }

    /// Remove every trace of an event from both queues
    pub fn remove_all(&mut self, event_id: EventId) -> bool {
        let had_view = self.views.remove(&event_id);
        let had_interest = self.interests.remove(&event_id).is_some();
        self.view_retries.remove(&event_id);
        had_view || had_interest
    }

    /// Drop failed entries whose first attempt is older than `cutoff`
    ///
    /// Entries that never failed are left alone. Returns the evicted ids.
    pub fn evict_failed(&mut self, cutoff: i64) -> Vec<EventId> {
        let mut evicted: Vec<EventId> = self
            .interests
            .values()
            .filter(|change| change.retry_count > 0 && change.timestamp < cutoff)
            .map(|change| change.event_id)
            .collect();
        for id in &evicted {
            self.interests.remove(id);
        }

        let stale_views: Vec<EventId> = self
            .view_retries
            .iter()
            .filter(|(_, retry)| retry.first_failure < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in stale_views {
            self.view_retries.remove(&id);
            self.views.remove(&id);
            evicted.push(id);
        }

        evicted
    }
}
