//! Storage layer
//!
//! The engine persists its whole state into a single durable slot. The slot
//! lives behind the small [`KeyValueStore`] capability so the engine does not
//! care whether it is backed by a file, an embedded database, or memory.
//!
//! ## Backends
//!
//! - [`FileStore`]: one JSON file per key, written atomically
//! - [`MemoryStore`]: in-process map for tests and memory-only mode

pub mod error;
pub mod file;
pub mod memory;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use persistence::{PersistedState, STATE_KEY};

/// Durable key-value slot
///
/// Implementations must be safe to call from any thread; the engine calls
/// them synchronously while holding its state lock.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;
}
