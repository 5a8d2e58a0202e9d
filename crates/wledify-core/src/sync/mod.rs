//! Synchronization orchestrator
//!
//! Owns the context every component works against (token store, device
//! target, palette cache, analyzer) and wires the one-way flow:
//! login -> token -> poll -> palette -> dispatch, with the spectrum analyzer
//! as an independent source feeding the same dispatcher.
//!
//! All state lives on the caller's task. Network work is spawned and its
//! result comes back through a channel that [`SyncOrchestrator::tick`]
//! drains, so the UI loop never waits on I/O.

mod status;

pub use status::{
    Alert, AlertLevel, PaletteStatus, SyncStatus, EXTRACTING, EXTRACTION_FAILED, NOTHING_PLAYING,
    NO_ARTWORK, NO_COLORS, NO_VALID_COLOR,
};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use url::Url;

use crate::auth::{
    exchange_code, AuthFlow, AuthState, CallbackCancel, CallbackListener, CallbackParams,
    TokenGrant, TokenStore,
};
use crate::config::AppConfig;
use crate::error::{AuthError, PaletteUnavailable};
use crate::palette::{HttpImageLoader, ImageLoader, Palette, PaletteExtractor};
use crate::playback::{ArtworkChange, FetchResult, PlaybackPoller, PollOutcome};
use crate::spectrum::{
    reactive_command, AudioInput, CpalInput, ReactiveThrottle, SpectrumAnalyzer, SpectrumCanvas,
    SpectrumFrame,
};
use crate::storage::SharedStore;
use crate::wled::{DeviceTarget, DispatchOutcome, LightCommand, LightSink, WledDispatcher};

/// Outbound collaborators, swappable in tests
pub struct Services {
    pub sink: Arc<dyn LightSink>,
    pub images: Arc<dyn ImageLoader>,
    pub audio: Box<dyn AudioInput>,
}

impl Services {
    /// HTTP dispatcher, HTTP artwork loader and the default microphone
    pub fn production(config: &AppConfig) -> Result<Self> {
        let device_client = reqwest::Client::builder()
            .timeout(config.wled.request_timeout())
            .build()
            .context("Failed to build WLED HTTP client")?;
        let image_client = reqwest::Client::builder()
            .timeout(config.polling.request_timeout())
            .build()
            .context("Failed to build artwork HTTP client")?;

        Ok(Self {
            sink: Arc::new(WledDispatcher::new(device_client)),
            images: Arc::new(HttpImageLoader::new(image_client)),
            audio: Box::new(CpalInput::new()),
        })
    }
}

/// Results of spawned work, applied on the owning task
enum TaskResult {
    Polled {
        generation: u64,
        fetched: FetchResult,
    },
    Palette {
        url: String,
        result: Result<Arc<Palette>, PaletteUnavailable>,
    },
    Dispatched {
        reactive: bool,
        outcome: DispatchOutcome,
    },
    Callback {
        attempt: u64,
        result: Result<CallbackParams, AuthError>,
    },
    Exchanged {
        attempt: u64,
        result: Result<TokenGrant, AuthError>,
    },
}

pub struct SyncOrchestrator {
    config: AppConfig,
    storage: SharedStore,
    http: reqwest::Client,
    tokens: TokenStore,
    device: DeviceTarget,
    auth: AuthFlow,
    poller: PlaybackPoller,
    extractor: Arc<PaletteExtractor>,
    sink: Arc<dyn LightSink>,
    analyzer: SpectrumAnalyzer,
    throttle: ReactiveThrottle,
    reactive_in_flight: bool,
    status: SyncStatus,
    alerts: VecDeque<Alert>,
    next_poll: Option<Instant>,
    login_attempt: u64,
    callback_cancel: Option<CallbackCancel>,
    pending: usize,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results_rx: mpsc::UnboundedReceiver<TaskResult>,
}

impl SyncOrchestrator {
    pub fn new(config: AppConfig, storage: SharedStore, services: Services) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.polling.request_timeout())
            .build()
            .context("Failed to build Spotify HTTP client")?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        Ok(Self {
            tokens: TokenStore::load(storage.clone()),
            device: DeviceTarget::load(&storage),
            auth: AuthFlow::new(config.spotify.clone(), storage.clone()),
            poller: PlaybackPoller::new(http.clone(), &config.spotify.api_base_url),
            extractor: Arc::new(PaletteExtractor::new(services.images)),
            sink: services.sink,
            analyzer: SpectrumAnalyzer::new(services.audio, config.spectrum.bins),
            throttle: ReactiveThrottle::new(config.spectrum.reactive_min_interval()),
            reactive_in_flight: false,
            status: SyncStatus::default(),
            alerts: VecDeque::new(),
            next_poll: None,
            login_attempt: 0,
            callback_cancel: None,
            pending: 0,
            results_tx,
            results_rx,
            http,
            storage,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn device(&self) -> &DeviceTarget {
        &self.device
    }

    pub fn auth_state(&self) -> &AuthState {
        self.auth.state()
    }

    /// A valid token is held. `false` means the UI shows the login view.
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_valid()
    }

    pub fn is_polling(&self) -> bool {
        self.next_poll.is_some()
    }

    pub fn is_audio_running(&self) -> bool {
        self.analyzer.is_running()
    }

    pub fn spectrum_canvas(&self) -> &SpectrumCanvas {
        self.analyzer.canvas()
    }

    pub fn resize_spectrum(&mut self, width: u16, height: u16) {
        self.analyzer.resize_canvas(width, height);
    }

    /// Alerts raised since the last call, oldest first
    pub fn take_alerts(&mut self) -> Vec<Alert> {
        self.alerts.drain(..).collect()
    }

    /// Spawned work whose result has not been applied yet
    pub fn has_pending_tasks(&self) -> bool {
        self.pending > 0
    }

    /// Begin polling if a still-valid token was restored
    pub fn start(&mut self, now: Instant) {
        if self.tokens.is_valid() {
            tracing::info!("Valid token restored, polling playback");
            self.poller.resume();
            self.next_poll = Some(now);
        } else {
            self.poller.suspend();
        }
    }

    /// Apply finished work, then issue a poll if one is due.
    ///
    /// Returns whether the status may have changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Ok(result) = self.results_rx.try_recv() {
            self.handle(result);
            changed = true;
        }

        if let Some(due) = self.next_poll {
            if now >= due {
                self.next_poll = Some(now + self.config.polling.interval());
                self.spawn_poll();
                changed = true;
            }
        }
        changed
    }

    /// Wait until every spawned task, and anything it triggered, has been applied
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            match self.results_rx.recv().await {
                Some(result) => self.handle(result),
                None => break,
            }
        }
    }

    /// Poll now, outside the interval
    pub fn request_refresh(&mut self) {
        self.spawn_poll();
    }

    /// Send the most dominant cached color to the device
    pub fn send_current_color(&mut self) {
        let palette = match &self.status.palette {
            PaletteStatus::Ready(palette) => Some(palette.clone()),
            // Previous artwork's palette stays usable until the new one lands
            PaletteStatus::Extracting(_) => self.extractor.current(),
            _ => None,
        };
        let Some(palette) = palette else {
            self.status.wled_message = Some(NO_COLORS.to_string());
            return;
        };
        let Some(swatch) = palette.dominant() else {
            self.status.wled_message = Some(NO_VALID_COLOR.to_string());
            return;
        };

        tracing::info!(color = %swatch.hex, device = %self.device.ip(), "Sending color to WLED");
        let command = LightCommand::solid_color(swatch.red, swatch.green, swatch.blue);
        self.spawn_dispatch(command, false);
    }

    /// Replace and persist the device address. Memory follows storage.
    pub fn set_device_ip(&mut self, ip: &str) -> Result<()> {
        let target = DeviceTarget::new(ip);
        target
            .save(&self.storage)
            .context("Failed to save WLED IP")?;
        tracing::info!(device = %target.ip(), "WLED device updated");
        self.device = target;
        Ok(())
    }

    /// Start or stop microphone analysis. Returns whether it is now running.
    pub fn toggle_audio(&mut self) -> bool {
        match self.analyzer.toggle() {
            Ok(running) => {
                if !running {
                    self.throttle.reset();
                }
                running
            }
            Err(e) => {
                self.alerts
                    .push_back(Alert::error(format!("Could not access microphone: {}", e)));
                false
            }
        }
    }

    /// Flip audio-reactive dispatch. Returns the new setting.
    pub fn toggle_reactive(&mut self) -> bool {
        self.status.reactive = !self.status.reactive;
        self.throttle.reset();
        tracing::info!(enabled = self.status.reactive, "Audio-reactive dispatch toggled");
        self.status.reactive
    }

    /// One display tick of the analyzer; may dispatch a reactive command
    pub fn spectrum_tick(&mut self, now: Instant) -> Option<SpectrumFrame> {
        let frame = self.analyzer.tick()?;

        if self.status.reactive
            && !self.device.is_empty()
            && !self.reactive_in_flight
            && self.throttle.ready(now)
        {
            let command = reactive_command(
                frame.magnitudes(),
                self.config.spectrum.reactive_mode,
                self.config.spectrum.led_count,
            );
            self.reactive_in_flight = true;
            self.spawn_dispatch(command, true);
        }
        Some(frame)
    }

    /// Start a login attempt and return the URL to open in the browser.
    ///
    /// Any earlier attempt is abandoned.
    pub fn begin_login(&mut self) -> Result<Url, AuthError> {
        self.cancel_login();
        self.auth.begin().map_err(|e| {
            self.alerts.push_back(auth_alert(&e));
            e
        })
    }

    /// Bind the redirect URI and wait for the browser in the background
    pub fn listen_for_callback(&mut self) -> Result<(), AuthError> {
        let listener = CallbackListener::bind(&self.config.spotify.redirect_uri).map_err(|e| {
            self.alerts.push_back(auth_alert(&e));
            e
        })?;
        self.callback_cancel = Some(listener.cancel_handle());

        let attempt = self.login_attempt;
        let timeout = self.config.spotify.callback_timeout();
        let tx = self.results_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || listener.wait(timeout))
                .await
                .unwrap_or_else(|e| Err(AuthError::CallbackServer(e.to_string())));
            let _ = tx.send(TaskResult::Callback { attempt, result });
        });
        Ok(())
    }

    /// Feed the redirect parameters into the flow and exchange the code
    pub fn complete_login(&mut self, params: &CallbackParams) {
        let request = match self.auth.prepare_exchange(params) {
            Ok(request) => request,
            Err(e) => {
                self.alerts.push_back(auth_alert(&e));
                return;
            }
        };

        let attempt = self.login_attempt;
        let client = self.http.clone();
        let tx = self.results_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = exchange_code(&client, request).await;
            let _ = tx.send(TaskResult::Exchanged { attempt, result });
        });
    }

    /// Forget the token and any pending login, and stop polling
    pub fn logout(&mut self) {
        if let Err(e) = self.tokens.clear() {
            tracing::warn!("Failed to clear token: {:#}", e);
        }
        self.cancel_login();
        if let Err(e) = self.auth.reset() {
            tracing::warn!("Failed to discard pending login: {:#}", e);
        }
        self.poller.suspend();
        self.extractor.invalidate();
        self.next_poll = None;
        self.status.reset_playback();
        tracing::info!("Logged out");
    }

    fn cancel_login(&mut self) {
        self.login_attempt += 1;
        if let Some(cancel) = self.callback_cancel.take() {
            cancel.cancel();
        }
    }

    fn spawn_poll(&mut self) {
        match self.poller.begin(&mut self.tokens) {
            Ok(ticket) => {
                let tx = self.results_tx.clone();
                self.pending += 1;
                let generation = ticket.generation();
                tokio::spawn(async move {
                    let fetched = ticket.fetch().await;
                    let _ = tx.send(TaskResult::Polled {
                        generation,
                        fetched,
                    });
                });
            }
            Err(outcome) => self.apply_poll(outcome),
        }
    }

    fn spawn_extraction(&mut self, url: String) {
        self.status.palette = PaletteStatus::Extracting(url.clone());
        let extractor = self.extractor.clone();
        let tx = self.results_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = extractor.extract(&url).await;
            let _ = tx.send(TaskResult::Palette { url, result });
        });
    }

    fn spawn_dispatch(&mut self, command: LightCommand, reactive: bool) {
        let sink = self.sink.clone();
        let target = self.device.clone();
        let tx = self.results_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let outcome = sink.send(&target, &command).await;
            let _ = tx.send(TaskResult::Dispatched { reactive, outcome });
        });
    }

    fn handle(&mut self, result: TaskResult) {
        self.pending = self.pending.saturating_sub(1);
        match result {
            TaskResult::Polled {
                generation,
                fetched,
            } => {
                let outcome = self.poller.apply(generation, fetched, &mut self.tokens);
                self.apply_poll(outcome);
            }
            TaskResult::Palette { url, result } => self.apply_palette(url, result),
            TaskResult::Dispatched { reactive, outcome } => {
                if reactive {
                    self.reactive_in_flight = false;
                    // Successful reactive sends are too frequent to report
                    if outcome.accepted {
                        return;
                    }
                }
                if outcome.accepted {
                    self.status.last_sent = outcome.sent_at;
                }
                self.status.wled_message = Some(outcome.message);
            }
            TaskResult::Callback { attempt, result } => {
                if attempt != self.login_attempt {
                    return;
                }
                self.callback_cancel = None;
                match result {
                    Ok(params) => self.complete_login(&params),
                    Err(e) => {
                        tracing::warn!("Login callback failed: {}", e);
                        self.alerts.push_back(auth_alert(&e));
                    }
                }
            }
            TaskResult::Exchanged { attempt, result } => {
                if attempt != self.login_attempt {
                    tracing::debug!("Dropping token exchange for an abandoned login");
                    return;
                }
                match self.auth.finish(result, &mut self.tokens) {
                    Ok(()) => {
                        self.poller.resume();
                        self.status.reset_playback();
                        self.next_poll = Some(Instant::now());
                        self.alerts.push_back(Alert::info("Logged in to Spotify."));
                    }
                    Err(e) => self.alerts.push_back(auth_alert(&e)),
                }
            }
        }
    }

    fn apply_poll(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Updated { state, artwork } => {
                self.status.polled = true;
                self.status.poll_error = None;
                self.status.playback = state;
                match artwork {
                    ArtworkChange::New(url) => self.spawn_extraction(url),
                    ArtworkChange::Cleared => {
                        self.extractor.invalidate();
                        self.status.palette = PaletteStatus::NoArtwork;
                    }
                    ArtworkChange::Unchanged => {}
                }
            }
            PollOutcome::NeedsReauth => {
                // Silent demotion to the login view
                self.next_poll = None;
                self.extractor.invalidate();
                self.status.reset_playback();
            }
            PollOutcome::Failed(e) => self.status.poll_error = Some(e.to_string()),
            PollOutcome::Skipped => {}
        }
    }

    fn apply_palette(&mut self, url: String, result: Result<Arc<Palette>, PaletteUnavailable>) {
        if !matches!(&self.status.palette, PaletteStatus::Extracting(pending) if *pending == url) {
            tracing::debug!(url = %url, "Ignoring palette for superseded artwork");
            return;
        }

        match result {
            Ok(palette) => {
                self.status.palette = PaletteStatus::Ready(palette);
                if self.config.wled.auto_send_on_change {
                    self.send_current_color();
                }
            }
            Err(e) => self.status.palette = PaletteStatus::Unavailable(e.to_string()),
        }
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(cancel) = self.callback_cancel.take() {
            cancel.cancel();
        }
    }
}

/// User-facing text for a failed login step
fn auth_alert(err: &AuthError) -> Alert {
    let message = match err {
        AuthError::Denied(_) | AuthError::MissingCode => "Spotify authentication failed.".to_string(),
        AuthError::SessionLost => {
            "Authentication session error. Please try logging in again.".to_string()
        }
        AuthError::ExchangeFailed(reason) => format!("Error fetching Spotify token: {}", reason),
        other => other.to_string(),
    };
    Alert::error(message)
}
