//! wledify core - the playback-to-light synchronization engine
//!
//! This crate provides everything the `wledify` binary drives:
//! - Spotify PKCE login and bearer token lifecycle
//! - "Now playing" polling with artwork change detection
//! - Album artwork palette extraction with a single-flight cache
//! - Microphone spectrum analysis and lighting intensity mapping
//! - Best-effort dispatch of JSON state commands to WLED devices
//! - The orchestrator wiring all of the above together

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod palette;
pub mod paths;
pub mod playback;
pub mod spectrum;
pub mod storage;
pub mod sync;
pub mod wled;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use auth::{AuthFlow, Token, TokenStore};
pub use config::AppConfig;
pub use error::{AuthError, MediaAccessError, PaletteUnavailable, PollError};
pub use palette::{Palette, PaletteExtractor, Swatch};
pub use playback::{PlaybackPoller, PlaybackState, PollOutcome};
pub use spectrum::{SpectrumAnalyzer, SpectrumFrame};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::SyncOrchestrator;
pub use wled::{DeviceTarget, DispatchOutcome, LightCommand, LightSink, WledDispatcher};
