//! Events REST API
//!
//! The engine talks to the backend through the [`EventsApi`] trait so the
//! network can be swapped for a scripted fake in tests. Every endpoint has
//! an explicit response type, and every failure is an [`ApiError`] that the
//! sync executor classifies as either "entity deleted" or "try again later".
//!
//! ## Endpoints
//!
//! - `GET  /events/{id}` - existence probe and authoritative counts
//! - `GET  /events/{id}/interest` - caller's interest status
//! - `POST /events/{id}/interest` - apply an add/remove
//! - `POST /events/{id}/view` - record a view

mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{EventId, InterestAction};

pub use http::HttpEventsApi;

/// Authoritative event record from `GET /events/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: EventId,
    #[serde(default)]
    pub interest_count: u64,
    #[serde(default)]
    pub view_count: u64,
}

/// Interest status for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestStatus {
    pub interested: bool,
    pub interest_count: u64,
}

/// Result of recording a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStatus {
    pub view_count: u64,
    #[serde(default)]
    pub view_tracked: bool,
}

/// Body of `POST /events/{id}/interest`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InterestRequest {
    pub action: InterestAction,
}

/// Errors returned by API calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The event no longer exists on the server
    #[error("Event not found")]
    NotFound,

    /// The call did not complete within its timeout
    #[error("Request timed out")]
    Timeout,

    /// The server failed (5xx)
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Any other unexpected HTTP status
    #[error("Unexpected response: HTTP {0}")]
    Http(u16),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The engine is offline; nothing was sent
    #[error("Offline; request not sent")]
    Offline,

    /// The response body did not have the expected shape
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the failure means the event was deleted server-side
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => ApiError::NotFound,
            500..=599 => ApiError::Server(status),
            _ => ApiError::Http(status),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Backend operations used by the sync engine
#[async_trait]
pub trait EventsApi: Send + Sync {
    /// Fetch an event; `NotFound` means it was deleted
    async fn get_event(&self, event_id: EventId) -> ApiResult<EventSnapshot>;

    /// Fetch the caller's interest status for an event
    async fn get_interest(&self, event_id: EventId) -> ApiResult<InterestStatus>;

    /// Apply an interest change
    async fn apply_interest(
        &self,
        event_id: EventId,
        action: InterestAction,
    ) -> ApiResult<InterestStatus>;

    /// Record a view of an event
    async fn record_view(&self, event_id: EventId) -> ApiResult<ViewStatus>;
}
