//! In-process key/value store

use std::collections::HashMap;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use super::KeyValueStore;

/// Volatile store used by tests and when the storage file cannot be opened
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating a full or read-only disk
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.lock() {
            bail!("storage is read-only");
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.values.lock().remove(key);
        Ok(())
    }
}
