//! Persisted key-value backends for snapshots.
//!
//! The application only needs `load`/`save` of whole strings under a key;
//! the snapshot record is stored as one serialized JSON document.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// An opaque string store reachable by key.
pub trait SnapshotStorage: Send + Sync {
    /// Read the value under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: String) -> Result<()>;

    /// Delete the value under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
