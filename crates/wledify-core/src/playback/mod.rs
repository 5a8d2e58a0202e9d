//! "Now playing" polling
//!
//! Polls Spotify's currently-playing endpoint and decides whether the
//! artwork changed since the last observation. The artwork URL is the only
//! deduplication key: the same track with the same artwork never triggers
//! palette work twice.
//!
//! A poll is split into [`PlaybackPoller::begin`] (token check and
//! single-flight guard), [`PollTicket::fetch`] (the HTTP call, safe to run on
//! a spawned task) and [`PlaybackPoller::apply`] (interpreting the result
//! against the token store).

use serde::Deserialize;

use crate::auth::TokenStore;
use crate::constants::spotify::CURRENTLY_PLAYING_PATH;
use crate::error::PollError;

/// Last observed playing item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub track_name: String,
    pub artist_names: Vec<String>,
    pub album_name: String,
    pub artwork_url: Option<String>,
}

impl PlaybackState {
    /// Artist names joined for display
    pub fn artists(&self) -> String {
        self.artist_names.join(", ")
    }
}

/// How the artwork moved relative to the previous poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkChange {
    /// Same artwork URL (or still none)
    Unchanged,
    /// A different artwork URL appeared
    New(String),
    /// Nothing playing, or the item has no artwork
    Cleared,
}

/// Result of one poll, as the orchestrator sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The endpoint answered; `state` is `None` when nothing is playing
    Updated {
        state: Option<PlaybackState>,
        artwork: ArtworkChange,
    },
    /// Token missing, expired or rejected; the token has been cleared
    NeedsReauth,
    /// Transient failure; the next scheduled poll retries
    Failed(PollError),
    /// Not polled: another poll is in flight or polling is suspended.
    /// Also returned for results from before the last logout or login.
    Skipped,
}

/// Raw interpretation of the HTTP exchange, before any state is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Item(PlaybackState),
    NoItem,
    Unauthorized,
    Failed(PollError),
}

/// Owned request data for one poll
#[derive(Clone)]
pub struct PollTicket {
    client: reqwest::Client,
    url: String,
    bearer: String,
    generation: u64,
}

impl PollTicket {
    /// Session this request was issued in; hand it back to [`PlaybackPoller::apply`]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn fetch(self) -> FetchResult {
        fetch_now_playing(&self.client, &self.url, &self.bearer).await
    }
}

#[derive(Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    item: Option<Item>,
}

#[derive(Deserialize)]
struct Item {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    album: Option<Album>,
    // Episodes carry images and a show instead of an album
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    show: Option<Show>,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

#[derive(Deserialize)]
struct Album {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Deserialize)]
struct Show {
    #[serde(default)]
    name: String,
    #[serde(default)]
    publisher: Option<String>,
}

#[derive(Deserialize)]
struct Image {
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

/// Highest-resolution image; Spotify lists largest first, but don't rely on it
fn best_image(images: &[Image]) -> Option<String> {
    images
        .iter()
        .enumerate()
        .max_by_key(|(index, image)| {
            let area = u64::from(image.width.unwrap_or(0)) * u64::from(image.height.unwrap_or(0));
            // Ties keep the earliest entry
            (area, std::cmp::Reverse(*index))
        })
        .map(|(_, image)| image.url.clone())
        .filter(|url| !url.is_empty())
}

impl From<Item> for PlaybackState {
    fn from(item: Item) -> Self {
        let (album_name, artwork_url) = match (&item.album, &item.show) {
            (Some(album), _) => (album.name.clone(), best_image(&album.images)),
            (None, Some(show)) => (show.name.clone(), best_image(&item.images)),
            (None, None) => (String::new(), best_image(&item.images)),
        };
        let mut artist_names: Vec<String> = item.artists.into_iter().map(|a| a.name).collect();
        if artist_names.is_empty() {
            if let Some(publisher) = item.show.and_then(|s| s.publisher) {
                artist_names.push(publisher);
            }
        }
        Self {
            track_name: item.name,
            artist_names,
            album_name,
            artwork_url,
        }
    }
}

/// GET the currently-playing endpoint with a bearer token
pub async fn fetch_now_playing(client: &reqwest::Client, url: &str, bearer: &str) -> FetchResult {
    let response = match client.get(url).bearer_auth(bearer).send().await {
        Ok(response) => response,
        Err(e) => return FetchResult::Failed(PollError::Transport(e.to_string())),
    };

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return FetchResult::Unauthorized;
    }
    if status == reqwest::StatusCode::NO_CONTENT {
        return FetchResult::NoItem;
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => return FetchResult::Failed(PollError::Transport(e.to_string())),
    };

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.to_string());
        return FetchResult::Failed(PollError::Transport(message));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return FetchResult::NoItem;
    }

    match serde_json::from_slice::<CurrentlyPlaying>(&body) {
        Ok(CurrentlyPlaying { item: Some(item) }) => FetchResult::Item(item.into()),
        Ok(CurrentlyPlaying { item: None }) => FetchResult::NoItem,
        Err(e) => FetchResult::Failed(PollError::Decode(e.to_string())),
    }
}

/// Tracks the last observation and guards against overlapping polls
pub struct PlaybackPoller {
    client: reqwest::Client,
    url: String,
    // `None` until the first successful poll
    last_artwork: Option<Option<String>>,
    last_state: Option<PlaybackState>,
    in_flight: bool,
    suspended: bool,
    // Bumped on suspend and resume so results from an earlier session are dropped
    generation: u64,
}

impl PlaybackPoller {
    pub fn new(client: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            client,
            url: format!(
                "{}{}",
                api_base_url.trim_end_matches('/'),
                CURRENTLY_PLAYING_PATH
            ),
            last_artwork: None,
            last_state: None,
            in_flight: false,
            suspended: false,
            generation: 0,
        }
    }

    /// Endpoint URL being polled
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn last_state(&self) -> Option<&PlaybackState> {
        self.last_state.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// True after a rejected or missing token, until [`PlaybackPoller::resume`]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Stop polling (logout)
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.start_generation();
    }

    /// Re-enable polling after a fresh login. Forgets the last observation
    /// so the first poll re-evaluates the artwork.
    pub fn resume(&mut self) {
        self.suspended = false;
        self.last_artwork = None;
        self.last_state = None;
        self.start_generation();
    }

    /// Requests still outstanding belong to the old session and no longer
    /// hold the in-flight slot
    fn start_generation(&mut self) {
        self.generation += 1;
        self.in_flight = false;
    }

    /// Check the token and claim the single in-flight slot.
    ///
    /// Returns the outcome directly when no request should be made.
    pub fn begin(&mut self, tokens: &mut TokenStore) -> Result<PollTicket, PollOutcome> {
        if self.in_flight || self.suspended {
            return Err(PollOutcome::Skipped);
        }

        let Some(bearer) = tokens.bearer().map(str::to_string) else {
            tracing::info!("No valid Spotify token, re-authentication required");
            if let Err(e) = tokens.clear() {
                tracing::warn!("Failed to clear token: {:#}", e);
            }
            self.suspended = true;
            return Err(PollOutcome::NeedsReauth);
        };

        self.in_flight = true;
        Ok(PollTicket {
            client: self.client.clone(),
            url: self.url.clone(),
            bearer,
            generation: self.generation,
        })
    }

    /// Interpret a fetch result and release the in-flight slot.
    ///
    /// Results issued before the last suspend or resume are dropped untouched.
    pub fn apply(
        &mut self,
        generation: u64,
        fetched: FetchResult,
        tokens: &mut TokenStore,
    ) -> PollOutcome {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Dropping stale poll result");
            return PollOutcome::Skipped;
        }
        self.in_flight = false;
        if self.suspended {
            return PollOutcome::Skipped;
        }

        match fetched {
            FetchResult::Unauthorized => {
                tracing::info!("Spotify rejected the token, re-authentication required");
                if let Err(e) = tokens.clear() {
                    tracing::warn!("Failed to clear token: {:#}", e);
                }
                self.suspended = true;
                PollOutcome::NeedsReauth
            }
            FetchResult::Failed(e) => {
                tracing::warn!("Playback poll failed: {}", e);
                PollOutcome::Failed(e)
            }
            FetchResult::NoItem => self.observe(None),
            FetchResult::Item(state) => self.observe(Some(state)),
        }
    }

    /// Poll inline: begin, fetch, apply
    pub async fn poll(&mut self, tokens: &mut TokenStore) -> PollOutcome {
        match self.begin(tokens) {
            Ok(ticket) => {
                let generation = ticket.generation();
                let fetched = ticket.fetch().await;
                self.apply(generation, fetched, tokens)
            }
            Err(outcome) => outcome,
        }
    }

    fn observe(&mut self, state: Option<PlaybackState>) -> PollOutcome {
        let artwork = state.as_ref().and_then(|s| s.artwork_url.clone());
        let change = match (&self.last_artwork, &artwork) {
            (Some(previous), current) if previous == current => ArtworkChange::Unchanged,
            (_, Some(url)) => ArtworkChange::New(url.clone()),
            (_, None) => ArtworkChange::Cleared,
        };
        if change != ArtworkChange::Unchanged {
            tracing::debug!(artwork = ?artwork, "Artwork changed");
        }
        self.last_artwork = Some(artwork);
        self.last_state = state.clone();
        PollOutcome::Updated {
            state,
            artwork: change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{now_ms, Token};
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::test_support::MockServer;
    use std::sync::Arc;

    const TRACK: &str = r#"{
        "is_playing": true,
        "item": {
            "name": "Song A",
            "artists": [{"name": "Artist 1"}, {"name": "Artist 2"}],
            "album": {
                "name": "Album X",
                "images": [
                    {"url": "https://i.scdn.co/image/small", "width": 64, "height": 64},
                    {"url": "https://i.scdn.co/image/large", "width": 640, "height": 640},
                    {"url": "https://i.scdn.co/image/medium", "width": 300, "height": 300}
                ]
            }
        }
    }"#;

    fn valid_tokens() -> (TokenStore, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        let mut tokens = TokenStore::new(storage.clone());
        tokens.set(Token::new("tok", now_ms() + 60_000)).unwrap();
        (tokens, storage)
    }

    fn poller(server: &MockServer) -> PlaybackPoller {
        PlaybackPoller::new(reqwest::Client::new(), &server.url("/v1/"))
    }

    #[tokio::test]
    async fn test_item_is_parsed_with_largest_artwork() {
        let server = MockServer::start();
        server.enqueue_json(200, TRACK);
        let (mut tokens, _) = valid_tokens();
        let mut poller = poller(&server);

        let outcome = poller.poll(&mut tokens).await;
        let expected = PlaybackState {
            track_name: "Song A".to_string(),
            artist_names: vec!["Artist 1".to_string(), "Artist 2".to_string()],
            album_name: "Album X".to_string(),
            artwork_url: Some("https://i.scdn.co/image/large".to_string()),
        };
        assert_eq!(
            outcome,
            PollOutcome::Updated {
                state: Some(expected.clone()),
                artwork: ArtworkChange::New("https://i.scdn.co/image/large".to_string()),
            }
        );
        assert_eq!(expected.artists(), "Artist 1, Artist 2");

        let requests = server.requests();
        assert_eq!(requests[0].url, "/v1/me/player/currently-playing");
        assert_eq!(requests[0].header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_identical_artwork_is_unchanged() {
        let server = MockServer::start();
        server.enqueue_json(200, TRACK);
        server.enqueue_json(200, TRACK);
        let (mut tokens, _) = valid_tokens();
        let mut poller = poller(&server);

        assert!(matches!(
            poller.poll(&mut tokens).await,
            PollOutcome::Updated { artwork: ArtworkChange::New(_), .. }
        ));
        assert!(matches!(
            poller.poll(&mut tokens).await,
            PollOutcome::Updated { artwork: ArtworkChange::Unchanged, .. }
        ));
    }

    #[tokio::test]
    async fn test_no_content_clears_state() {
        let server = MockServer::start();
        server.enqueue_json(200, TRACK);
        server.enqueue_text(204, "");
        let (mut tokens, _) = valid_tokens();
        let mut poller = poller(&server);

        poller.poll(&mut tokens).await;
        assert_eq!(
            poller.poll(&mut tokens).await,
            PollOutcome::Updated {
                state: None,
                artwork: ArtworkChange::Cleared,
            }
        );
        assert!(poller.last_state().is_none());
    }

    #[tokio::test]
    async fn test_item_without_artwork_is_cleared() {
        let server = MockServer::start();
        server.enqueue_json(
            200,
            r#"{"item": {"name": "Local file", "artists": [], "album": {"name": "", "images": []}}}"#,
        );
        let (mut tokens, _) = valid_tokens();
        let mut poller = poller(&server);

        match poller.poll(&mut tokens).await {
            PollOutcome::Updated { state: Some(state), artwork } => {
                assert_eq!(state.track_name, "Local file");
                assert_eq!(state.artwork_url, None);
                assert_eq!(artwork, ArtworkChange::Cleared);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_and_suspends() {
        let server = MockServer::start();
        server.enqueue_json(401, r#"{"error": {"status": 401, "message": "The access token expired"}}"#);
        let (mut tokens, storage) = valid_tokens();
        let mut poller = poller(&server);

        assert_eq!(poller.poll(&mut tokens).await, PollOutcome::NeedsReauth);
        assert!(!tokens.is_valid());
        assert!(storage.get(crate::constants::keys::ACCESS_TOKEN).is_none());
        assert!(poller.is_suspended());

        // Suspended: no further requests even with a new token
        tokens.set(Token::new("tok2", now_ms() + 60_000)).unwrap();
        assert_eq!(poller.poll(&mut tokens).await, PollOutcome::Skipped);
        assert_eq!(server.request_count(), 1);

        poller.resume();
        server.enqueue_json(200, TRACK);
        assert!(matches!(
            poller.poll(&mut tokens).await,
            PollOutcome::Updated { artwork: ArtworkChange::New(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_token_makes_no_request() {
        let server = MockServer::start();
        let storage = Arc::new(MemoryStore::new());
        let mut tokens = TokenStore::new(storage.clone());
        storage.set(crate::constants::keys::ACCESS_TOKEN, "stale").unwrap();
        let mut poller = poller(&server);

        assert_eq!(poller.poll(&mut tokens).await, PollOutcome::NeedsReauth);
        assert_eq!(server.request_count(), 0);
        assert!(storage.get(crate::constants::keys::ACCESS_TOKEN).is_none());
    }

    #[tokio::test]
    async fn test_server_error_keeps_token() {
        let server = MockServer::start();
        server.enqueue_json(503, r#"{"error": {"status": 503, "message": "Service unavailable"}}"#);
        let (mut tokens, _) = valid_tokens();
        let mut poller = poller(&server);

        assert_eq!(
            poller.poll(&mut tokens).await,
            PollOutcome::Failed(PollError::Transport("Service unavailable".to_string()))
        );
        assert!(tokens.is_valid());
        assert!(!poller.is_suspended());
        assert!(!poller.is_in_flight());
    }

    #[test]
    fn test_single_flight_guard() {
        let storage = Arc::new(MemoryStore::new());
        let mut tokens = TokenStore::new(storage);
        tokens.set(Token::new("tok", now_ms() + 60_000)).unwrap();
        let mut poller = PlaybackPoller::new(reqwest::Client::new(), "http://127.0.0.1:9");

        let ticket = poller.begin(&mut tokens).unwrap();
        assert!(matches!(poller.begin(&mut tokens), Err(PollOutcome::Skipped)));

        poller.apply(ticket.generation(), FetchResult::NoItem, &mut tokens);
        assert!(poller.begin(&mut tokens).is_ok());
    }

    #[test]
    fn test_result_after_suspend_is_dropped() {
        let storage = Arc::new(MemoryStore::new());
        let mut tokens = TokenStore::new(storage);
        tokens.set(Token::new("tok", now_ms() + 60_000)).unwrap();
        let mut poller = PlaybackPoller::new(reqwest::Client::new(), "http://127.0.0.1:9");

        let ticket = poller.begin(&mut tokens).unwrap();
        poller.suspend();
        assert_eq!(
            poller.apply(ticket.generation(), FetchResult::NoItem, &mut tokens),
            PollOutcome::Skipped
        );
        assert!(poller.last_state().is_none());
    }

    #[test]
    fn test_relogin_during_outstanding_poll_ignores_old_result() {
        let storage = Arc::new(MemoryStore::new());
        let mut tokens = TokenStore::new(storage);
        tokens.set(Token::new("old", now_ms() + 60_000)).unwrap();
        let mut poller = PlaybackPoller::new(reqwest::Client::new(), "http://127.0.0.1:9");

        let old_ticket = poller.begin(&mut tokens).unwrap();
        poller.suspend();
        tokens.set(Token::new("new", now_ms() + 60_000)).unwrap();
        poller.resume();

        // The old request no longer blocks the new session
        let new_ticket = poller.begin(&mut tokens).unwrap();
        assert_ne!(new_ticket.generation(), old_ticket.generation());

        let stale = poller.apply(old_ticket.generation(), FetchResult::Unauthorized, &mut tokens);
        assert_eq!(stale, PollOutcome::Skipped);
        assert!(tokens.is_valid());
        assert_eq!(tokens.bearer(), Some("new"));
        assert!(!poller.is_suspended());
        // and it did not release the new request's slot
        assert!(poller.is_in_flight());

        let current = poller.apply(new_ticket.generation(), FetchResult::NoItem, &mut tokens);
        assert!(matches!(current, PollOutcome::Updated { state: None, .. }));
        assert!(!poller.is_in_flight());
    }
}
