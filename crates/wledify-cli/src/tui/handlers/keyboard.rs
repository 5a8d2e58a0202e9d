//! Keyboard input

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::tui::app::{App, View};
use crate::tui::components::{IpAction, IpField, Toast};

impl App {
    pub fn handle_key(&mut self, key: KeyEvent) {
        if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
            return;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // Open editor swallows everything else
        if let Some(field) = self.ip_field.as_mut() {
            match field.handle_key(key) {
                IpAction::Continue => {}
                IpAction::Cancel => self.ip_field = None,
                IpAction::Save(ip) => {
                    self.ip_field = None;
                    self.save_device_ip(&ip);
                }
            }
            return;
        }

        match self.view() {
            View::Login => self.handle_login_key(key),
            View::Main => self.handle_main_key(key),
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('l') | KeyCode::Enter => self.start_login(),
            _ => {}
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('i') => {
                self.ip_field = Some(IpField::new(self.sync.device().ip()));
            }
            KeyCode::Char('s') => self.sync.send_current_color(),
            KeyCode::Char('a') => {
                self.sync.toggle_audio();
            }
            KeyCode::Char('v') => {
                let on = self.sync.toggle_reactive();
                let message = if on {
                    "Lights follow the microphone."
                } else {
                    "Lights follow the album colors."
                };
                self.toasts.push(Toast::info(message));
            }
            KeyCode::Char('r') => self.sync.request_refresh(),
            KeyCode::Char('o') => {
                self.sync.logout();
                self.toasts.push(Toast::info("Logged out of Spotify."));
            }
            _ => {}
        }
    }

    /// Failures surface through the orchestrator's alerts
    fn start_login(&mut self) {
        let Ok(url) = self.sync.begin_login() else {
            return;
        };
        if self.sync.listen_for_callback().is_err() {
            return;
        }
        if let Err(e) = webbrowser::open(url.as_str()) {
            tracing::warn!("Failed to open browser: {}", e);
        }
        self.login_url = Some(url.to_string());
    }

    fn save_device_ip(&mut self, ip: &str) {
        match self.sync.set_device_ip(ip) {
            Ok(()) if ip.is_empty() => self.toasts.push(Toast::success("WLED IP cleared.")),
            Ok(()) => self
                .toasts
                .push(Toast::success(format!("WLED IP saved: {}", ip))),
            Err(e) => {
                tracing::error!("Failed to save WLED IP: {:#}", e);
                self.toasts
                    .push(Toast::error(format!("Could not save WLED IP: {}", e)));
            }
        }
    }
}
