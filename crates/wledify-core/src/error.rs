//! Domain error types
//!
//! Each variant family maps onto one user-facing treatment: auth errors end
//! the current login attempt, poll and palette errors become inline status
//! text, media errors are shown once as an alert.

use thiserror::Error;

/// Login flow failure. Terminal for the current attempt; the user restarts it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The authorization server redirected back with an `error` parameter
    #[error("authorization denied: {0}")]
    Denied(String),

    /// A callback arrived but no pending verifier was stored
    #[error("authentication session lost, please log in again")]
    SessionLost,

    /// The token endpoint rejected the exchange or could not be reached
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The callback carried neither `code` nor `error`
    #[error("callback is missing the authorization code")]
    MissingCode,

    /// Client id or redirect URI is unusable
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The verifier or token could not be persisted
    #[error("storage error: {0}")]
    Storage(String),

    /// The loopback listener failed or timed out
    #[error("callback listener error: {0}")]
    CallbackServer(String),
}

/// Transient failure while polling the now-playing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// Connection failure or non-success status other than 401
    #[error("Spotify API error: {0}")]
    Transport(String),

    /// The body was not the JSON shape we expect
    #[error("unexpected response from Spotify: {0}")]
    Decode(String),
}

/// Why a palette could not be produced for a given artwork URL.
///
/// `Clone` because one in-flight extraction can have several waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaletteUnavailable {
    /// Network failure, non-success status or undecodable image
    #[error("failed to load album art: {0}")]
    LoadFailed(String),

    /// The extraction algorithm found nothing usable
    #[error("could not extract colors")]
    NoSwatches,
}

/// Microphone acquisition failure. Leaves the analyzer stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAccessError {
    #[error("no audio input device available")]
    NoInputDevice,

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("audio stream failed: {0}")]
    StreamFailed(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}
