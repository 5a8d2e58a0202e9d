//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// Spotify Web API endpoints and OAuth settings
pub mod spotify {
    /// Authorization endpoint the browser is sent to
    pub const AUTH_URL: &str = "https://accounts.spotify.com/authorize";

    /// Token endpoint for the authorization-code exchange
    pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

    /// Base URL for Web API calls
    pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

    /// Path of the "now playing" endpoint, relative to the API base
    pub const CURRENTLY_PLAYING_PATH: &str = "/me/player/currently-playing";

    /// Scopes required to read playback state
    pub const SCOPES: &str = "user-read-currently-playing user-read-playback-state";

    /// Loopback redirect URI registered with the Spotify app
    pub const REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

    /// PKCE verifier length (RFC 7636 allows 43..=128)
    pub const VERIFIER_LENGTH: usize = 128;
}

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Timeout for Spotify requests (token exchange, polling, artwork)
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for WLED dispatch - devices live on the LAN
    pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(3);

    /// How long the loopback listener waits for the browser redirect
    pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
}

/// Playback polling
pub mod polling {
    use super::*;

    /// Fixed "now playing" polling cadence
    pub const INTERVAL: Duration = Duration::from_secs(15);
}

/// Spectrum analysis and lighting
pub mod spectrum {
    /// Default number of frequency bins (analyser fftSize / 2)
    pub const DEFAULT_BINS: usize = 128;

    /// Smallest accepted bin count
    pub const MIN_BINS: usize = 16;

    /// Largest accepted bin count
    pub const MAX_BINS: usize = 4096;

    /// Default LED count for per-LED intensity mapping
    pub const DEFAULT_LED_COUNT: usize = 16;

    /// Minimum spacing between audio-reactive dispatches
    pub const REACTIVE_MIN_INTERVAL_MS: u64 = 100;

    /// Analyser smoothing between frames
    pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

    /// Magnitudes at or below this map to 0
    pub const MIN_DECIBELS: f32 = -100.0;

    /// Magnitudes at or above this map to 255
    pub const MAX_DECIBELS: f32 = -30.0;
}

/// Durable storage keys
pub mod keys {
    pub const ACCESS_TOKEN: &str = "spotify_access_token";
    pub const TOKEN_EXPIRES_AT: &str = "spotify_token_expires_at";
    pub const CODE_VERIFIER: &str = "spotify_code_verifier";
    pub const CODE_VERIFIER_CREATED_AT: &str = "spotify_code_verifier_created_at";
    pub const WLED_IP: &str = "wled_ip";
}

/// UI configuration
pub mod ui {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".wledify";
}
