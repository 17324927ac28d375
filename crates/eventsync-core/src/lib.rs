//! EventSync Core Library
//!
//! Client-side engine for two per-event interactions, "mark interested" and
//! "view tracked", that apply instantly on the device and reach the backend
//! eventually.
//!
//! # Architecture
//!
//! - **Local cache**: optimistic per-event state, answered synchronously
//! - **Pending queues**: durable intent (one interest change per event,
//!   a set of unsent views)
//! - **Sync executor**: drains the queues against the events API with
//!   exponential backoff and last-writer-wins reconciliation
//! - **Scheduler**: periodic syncs, connectivity transitions, cleanup
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let engine = SyncEngine::from_config(&config)?;
//!
//! // Applied immediately, synced later
//! let toggle = engine.toggle_interest(42);
//! assert!(toggle.is_optimistic);
//!
//! let report = engine.sync_now().await;
//! engine.dispose();
//! ```
//!
//! # Modules
//!
//! - `engine`: The sync engine (main entry point)
//! - `models`: Interaction state and queued intent
//! - `cache`: Optimistic local cache and reconciliation
//! - `queue`: Pending queues and retry policy
//! - `storage`: Key-value stores and the persisted snapshot
//! - `api`: Events REST client
//! - `sync`: Sync executor and scheduler
//! - `config`: Application configuration

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod models;
pub mod queue;
pub mod storage;
pub mod sync;

pub use api::{ApiError, ApiResult, EventsApi, HttpEventsApi};
pub use cache::LocalCache;
pub use config::Config;
pub use engine::{CleanupReport, InterestPhase, SyncEngine};
pub use models::{
    EngineStatus, EventId, EventInteractionState, InterestAction, InterestToggle,
    PendingInterestChange, ServerSnapshot, ViewTracking,
};
pub use queue::{PendingQueues, RetryPolicy};
pub use storage::{FileStore, KeyValueStore, MemoryStore, PersistedState, StorageError};
pub use sync::{SchedulerConfig, SchedulerHandle, SchedulerStatus, SyncReport};
