//! Application state and the main event loop

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};

use wledify_core::sync::Services;
use wledify_core::{AppConfig, FileStore, SyncOrchestrator};

use crate::tui::components::{IpField, Toast, ToastQueue, UNITS_PER_ROW};
use crate::tui::theme::Theme;

/// Which screen is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Main,
}

pub struct App {
    pub sync: SyncOrchestrator,
    pub theme: Theme,
    pub toasts: ToastQueue,
    /// Open while the user edits the device address
    pub ip_field: Option<IpField>,
    /// Authorization URL of the login in progress
    pub login_url: Option<String>,
    /// Last known inner area of the spectrum panel
    pub spectrum_area: Rect,
    pub should_quit: bool,
    pub needs_redraw: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let storage = Arc::new(FileStore::open_default().context("Failed to open local storage")?);
        let services = Services::production(&config)?;
        let sync = SyncOrchestrator::new(config, storage, services)?;
        Ok(Self::with_orchestrator(sync))
    }

    pub fn with_orchestrator(sync: SyncOrchestrator) -> Self {
        Self {
            sync,
            theme: Theme::default(),
            toasts: ToastQueue::new(),
            ip_field: None,
            login_url: None,
            spectrum_area: Rect::default(),
            should_quit: false,
            needs_redraw: true,
        }
    }

    pub fn view(&self) -> View {
        if self.sync.is_authenticated() {
            View::Main
        } else {
            View::Login
        }
    }

    /// Match the spectrum canvas to the panel it is drawn in
    pub fn set_spectrum_area(&mut self, area: Rect) {
        if area != self.spectrum_area {
            self.spectrum_area = area;
            self.sync
                .resize_spectrum(area.width, area.height.saturating_mul(UNITS_PER_ROW));
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.sync.start(Instant::now());

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.main_loop(&mut terminal).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    /// Pull finished background work into the UI state
    pub fn update(&mut self, now: Instant) {
        if self.sync.tick(now) {
            self.needs_redraw = true;
        }
        for alert in self.sync.take_alerts() {
            self.toasts.push(Toast::from(alert));
            self.needs_redraw = true;
        }
        if self.login_url.is_some() && self.sync.is_authenticated() {
            self.login_url = None;
        }

        if self.sync.is_audio_running() && self.sync.spectrum_tick(now).is_some() {
            self.needs_redraw = true;
        }
        if self.toasts.tick() || !self.toasts.is_empty() {
            // progress bars animate
            self.needs_redraw = true;
        }
    }

    async fn main_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        let mut event_stream = EventStream::new();

        loop {
            self.update(Instant::now());

            if self.needs_redraw {
                terminal.draw(|f| self.ui(f))?;
                self.needs_redraw = false;
            }

            tokio::select! {
                biased;

                maybe_event = event_stream.next() => {
                    if let Some(Ok(event)) = maybe_event {
                        match event {
                            Event::Key(key) => {
                                self.handle_key(key);
                                self.needs_redraw = true;
                            }
                            Event::Resize(_, _) => {
                                self.needs_redraw = true;
                            }
                            _ => {}
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(16)) => {}
            }

            if self.should_quit {
                tracing::info!("Quitting");
                break;
            }
        }
        Ok(())
    }
}
