//! Client-local durable storage
//!
//! Flat string key/value pairs, each independently readable and writable.
//! No schema versioning.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use anyhow::Result;

/// Durable key/value store shared by the token store, auth flow and device target
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value. Implementations must only expose the new value once it
    /// has been persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value (no-op if absent)
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several values as one persistence step
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several values as one persistence step
    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Shared handle to a store
pub type SharedStore = Arc<dyn KeyValueStore>;
