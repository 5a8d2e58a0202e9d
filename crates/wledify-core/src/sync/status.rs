//! What the UI shows
//!
//! Plain data rebuilt by the orchestrator as results arrive. Rendering code
//! reads it and never touches the components directly.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::palette::Palette;
use crate::playback::PlaybackState;

pub const NOTHING_PLAYING: &str = "N/A (Nothing playing or private session)";
pub const EXTRACTING: &str = "Extracting colors…";
pub const NO_ARTWORK: &str = "No album art available.";
pub const EXTRACTION_FAILED: &str = "Could not extract colors.";
pub const NO_COLORS: &str = "No colors extracted yet.";
pub const NO_VALID_COLOR: &str = "No valid color to send.";

/// Where palette extraction stands for the current artwork
#[derive(Debug, Clone, Default)]
pub enum PaletteStatus {
    #[default]
    Idle,
    Extracting(String),
    Ready(Arc<Palette>),
    NoArtwork,
    Unavailable(String),
}

impl PaletteStatus {
    pub fn palette(&self) -> Option<&Arc<Palette>> {
        match self {
            PaletteStatus::Ready(palette) => Some(palette),
            _ => None,
        }
    }

    /// Line shown in place of the swatches, if any
    pub fn message(&self) -> Option<&'static str> {
        match self {
            PaletteStatus::Idle => Some(NO_COLORS),
            PaletteStatus::Extracting(_) => Some(EXTRACTING),
            PaletteStatus::Ready(_) => None,
            PaletteStatus::NoArtwork => Some(NO_ARTWORK),
            PaletteStatus::Unavailable(_) => Some(EXTRACTION_FAILED),
        }
    }
}

/// Severity of a one-shot alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Error,
}

/// A message shown once, as a toast in the terminal UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Last observed item, `None` when nothing is playing
    pub playback: Option<PlaybackState>,
    /// Set once the first poll has answered
    pub polled: bool,
    /// Last poll failure, cleared by the next successful poll
    pub poll_error: Option<String>,
    pub palette: PaletteStatus,
    /// Outcome of the last WLED dispatch attempt
    pub wled_message: Option<String>,
    pub last_sent: Option<DateTime<Local>>,
    pub reactive: bool,
}

impl SyncStatus {
    pub fn track_line(&self) -> String {
        match &self.playback {
            Some(state) => state.track_name.clone(),
            None => NOTHING_PLAYING.to_string(),
        }
    }

    pub fn artwork_url(&self) -> Option<&str> {
        self.playback.as_ref().and_then(|s| s.artwork_url.as_deref())
    }

    pub(crate) fn reset_playback(&mut self) {
        self.playback = None;
        self.polled = false;
        self.poll_error = None;
        self.palette = PaletteStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_follow_palette_state() {
        assert_eq!(PaletteStatus::Idle.message(), Some("No colors extracted yet."));
        assert_eq!(PaletteStatus::NoArtwork.message(), Some("No album art available."));
        assert_eq!(
            PaletteStatus::Unavailable("boom".into()).message(),
            Some("Could not extract colors.")
        );
        assert!(PaletteStatus::Ready(Arc::new(Palette::new(Vec::new())))
            .message()
            .is_none());
    }

    #[test]
    fn test_track_line_when_idle() {
        assert_eq!(SyncStatus::default().track_line(), NOTHING_PLAYING);
    }
}
