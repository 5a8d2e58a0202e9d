//! Filesystem locations
//!
//! Everything lives under `~/.wledify` so a single directory can be wiped to
//! reset the app.

use std::path::PathBuf;

use crate::constants::ui::CONFIG_DIR_NAME;

/// Root config directory (`~/.wledify`), falling back to the working directory
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// TOML configuration file
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Flat key/value storage file (token, verifier, device IP)
pub fn storage_file() -> PathBuf {
    config_dir().join("storage.json")
}

/// Log directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
