//! JSON file backed key/value store
//!
//! Stores flat string values in `~/.wledify/storage.json` with secure
//! permissions. Keeps the parsed map in memory so reads never touch disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::KeyValueStore;
use crate::paths;

/// File-backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the default storage file
    pub fn open_default() -> Result<Self> {
        Self::open(paths::storage_file())
    }

    /// Open (or lazily create) a storage file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read storage file {:?}", path))?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse storage file {:?}", path))?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the map, persist it, then swap it in.
    ///
    /// The in-memory map only changes once the file write succeeded, so a
    /// failed write never leaves memory ahead of disk.
    fn update(&self, mutate: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let mut guard = self.values.lock();
        let mut next = guard.clone();
        mutate(&mut next);
        if next == *guard {
            return Ok(());
        }
        write_atomic(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

/// Write the map with the temp-file-then-rename pattern, 0600 on Unix
fn write_atomic(path: &Path, values: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create storage directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");
    let contents = serde_json::to_string_pretty(values)?;
    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write {:?}", temp_path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&temp_path) {
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o600);
            if let Err(e) = fs::set_permissions(&temp_path, permissions) {
                tracing::warn!("Failed to set 0600 permissions on storage file: {}", e);
            }
        }
    }

    fs::rename(&temp_path, path).with_context(|| format!("Failed to replace {:?}", path))?;
    tracing::debug!("Storage saved atomically to {:?}", path);
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}
