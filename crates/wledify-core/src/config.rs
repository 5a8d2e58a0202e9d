//! Application configuration
//!
//! Loaded from `~/.wledify/config.toml`. Every field has a default so a
//! missing file, or a file with only a `client_id`, is a valid config.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{http, polling, spectrum, spotify};
use crate::paths;

/// Environment variable overriding `spotify.client_id`
pub const CLIENT_ID_ENV: &str = "WLEDIFY_CLIENT_ID";

/// Environment variable overriding `spotify.redirect_uri`
pub const REDIRECT_URI_ENV: &str = "WLEDIFY_REDIRECT_URI";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub polling: PollingConfig,
    pub spectrum: SpectrumConfig,
    pub wled: WledConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// Public client id of the registered Spotify app. Empty means unconfigured.
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
    /// How long `login` waits for the browser redirect
    pub callback_timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: spotify::REDIRECT_URI.to_string(),
            scopes: spotify::SCOPES.to_string(),
            auth_url: spotify::AUTH_URL.to_string(),
            token_url: spotify::TOKEN_URL.to_string(),
            api_base_url: spotify::API_BASE_URL.to_string(),
            callback_timeout_secs: http::CALLBACK_TIMEOUT.as_secs(),
        }
    }
}

impl SpotifyConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: polling::INTERVAL.as_secs(),
            request_timeout_secs: http::REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// What an audio-reactive tick sends to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactiveMode {
    /// Segment brightness follows the bass intensity
    #[default]
    Bass,
    /// Individual LEDs follow the LED-count-sized intensity sequence
    Leds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub bins: usize,
    pub led_count: usize,
    pub reactive_min_interval_ms: u64,
    pub reactive_mode: ReactiveMode,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bins: spectrum::DEFAULT_BINS,
            led_count: spectrum::DEFAULT_LED_COUNT,
            reactive_min_interval_ms: spectrum::REACTIVE_MIN_INTERVAL_MS,
            reactive_mode: ReactiveMode::Bass,
        }
    }
}

impl SpectrumConfig {
    pub fn reactive_min_interval(&self) -> Duration {
        Duration::from_millis(self.reactive_min_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WledConfig {
    /// Send the dominant color automatically after every new palette
    pub auto_send_on_change: bool,
    pub request_timeout_secs: u64,
}

impl Default for WledConfig {
    fn default() -> Self {
        Self {
            auto_send_on_change: false,
            request_timeout_secs: http::DEVICE_TIMEOUT.as_secs(),
        }
    }
}

impl WledConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl AppConfig {
    /// Load from the default location and apply environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file())
    }

    /// Load from `path` (missing file means defaults) and apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            Self::parse(&content).with_context(|| format!("Invalid config {:?}", path))?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.normalize();
        Ok(config)
    }

    /// Parse TOML content without touching the environment
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(client_id) = lookup(CLIENT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.spotify.client_id = client_id.trim().to_string();
        }
        if let Some(redirect) = lookup(REDIRECT_URI_ENV).filter(|v| !v.trim().is_empty()) {
            self.spotify.redirect_uri = redirect.trim().to_string();
        }
    }

    /// Replace out-of-range values with defaults
    fn normalize(&mut self) {
        let bins = self.spectrum.bins;
        if !bins.is_power_of_two() || !(spectrum::MIN_BINS..=spectrum::MAX_BINS).contains(&bins) {
            tracing::warn!(
                bins,
                "spectrum.bins must be a power of two between {} and {}, using {}",
                spectrum::MIN_BINS,
                spectrum::MAX_BINS,
                spectrum::DEFAULT_BINS
            );
            self.spectrum.bins = spectrum::DEFAULT_BINS;
        }
        if self.spectrum.led_count == 0 {
            tracing::warn!("spectrum.led_count must be positive, using default");
            self.spectrum.led_count = spectrum::DEFAULT_LED_COUNT;
        }
    }

    /// Whether a client id has been supplied
    pub fn is_configured(&self) -> bool {
        !self.spotify.client_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load_from(&temp.path().join("nope.toml")).unwrap();
        assert_eq!(config.polling.interval_secs, 15);
        assert_eq!(config.polling.request_timeout_secs, 10);
        assert_eq!(config.spectrum.bins, 128);
        assert_eq!(config.spotify.redirect_uri, "http://127.0.0.1:8888/callback");
        assert!(!config.wled.auto_send_on_change);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            r#"
            [spotify]
            client_id = "abc123"

            [spectrum]
            bins = 256
            reactive_mode = "leds"
            "#,
        )
        .unwrap();

        assert_eq!(config.spotify.client_id, "abc123");
        assert_eq!(config.spotify.scopes, spotify::SCOPES);
        assert_eq!(config.spectrum.bins, 256);
        assert_eq!(config.spectrum.reactive_mode, ReactiveMode::Leds);
        assert_eq!(config.spectrum.led_count, 16);
        assert!(config.is_configured());
    }

    #[test]
    fn test_invalid_bins_fall_back_to_default() {
        for bins in [0, 100, 8, 8192] {
            let config = AppConfig::parse(&format!("[spectrum]\nbins = {}", bins)).unwrap();
            assert_eq!(config.spectrum.bins, 128, "bins = {}", bins);
        }
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = AppConfig::default();
        assert!(!config.is_configured());

        config.apply_overrides(|name| match name {
            CLIENT_ID_ENV => Some(" from-env ".to_string()),
            REDIRECT_URI_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.spotify.client_id, "from-env");
        assert_eq!(config.spotify.redirect_uri, spotify::REDIRECT_URI);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(AppConfig::parse("[polling\ninterval_secs = 3").is_err());
    }
}
