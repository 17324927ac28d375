//! Background synchronization
//!
//! - `executor`: drains the pending queues against the events API
//! - `scheduler`: runs the executor on a timer and on connectivity changes
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SyncEngine::from_config(&config)?;
//! let handle = spawn_scheduler(engine.clone(), SchedulerConfig::from(&config));
//!
//! engine.toggle_interest(42);
//! handle.set_online(false).await;
//!
//! handle.shutdown().await;
//! engine.dispose();
//! ```

mod executor;
mod scheduler;

pub use executor::{SyncItem, SyncOutcome, SyncReport};
pub use scheduler::{
    spawn_scheduler, SchedulerCommand, SchedulerConfig, SchedulerEvent, SchedulerHandle,
    SchedulerStatus,
};
