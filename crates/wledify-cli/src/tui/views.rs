//! Screen layouts

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};

use wledify_core::config::CLIENT_ID_ENV;
use wledify_core::paths;
use wledify_core::sync::PaletteStatus;

use crate::tui::app::{App, View};
use crate::tui::components::{
    render_spectrum, render_status_bar, render_toasts, swatch_lines, StatusInfo,
};
use crate::tui::utils::truncate_ellipsis;

impl App {
    pub fn ui(&mut self, f: &mut Frame) {
        let area = f.area();
        let bg = Block::default().style(Style::default().bg(self.theme.bg_color));
        f.render_widget(bg, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Fill(1), Constraint::Length(1)])
            .split(area);

        match self.view() {
            View::Login => self.render_login(f, chunks[0]),
            View::Main => self.render_main(f, chunks[0]),
        }

        let status = self.sync.status();
        let info = StatusInfo {
            authenticated: self.sync.is_authenticated(),
            device_ip: self.sync.device().ip(),
            audio: self.sync.is_audio_running(),
            reactive: status.reactive,
            busy: self.sync.has_pending_tasks(),
        };
        render_status_bar(f, chunks[1], &self.theme, &info);

        render_toasts(f.buffer_mut(), area, &self.toasts, &self.theme);
    }

    fn block<'a>(&self, title: &'a str) -> Block<'a> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.theme.border_color))
            .title(Span::styled(
                format!(" {} ", title),
                Style::default().fg(self.theme.accent_color),
            ))
    }

    fn render_login(&self, f: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let text = Style::default().fg(theme.text_color);
        let dim = Style::default().fg(theme.dim_color);

        let mut lines = vec![
            Line::from(Span::styled(
                "wledify",
                Style::default()
                    .fg(theme.accent_color)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Album colors from Spotify on your WLED lights",
                dim,
            )),
            Line::default(),
        ];

        if !self.sync.config().is_configured() {
            lines.push(Line::from(Span::styled(
                "No Spotify client id configured.",
                Style::default().fg(theme.warning_color),
            )));
            lines.push(Line::from(Span::styled(
                format!(
                    "Set spotify.client_id in {} or {}.",
                    paths::config_file().display(),
                    CLIENT_ID_ENV
                ),
                dim,
            )));
        } else if let Some(url) = &self.login_url {
            lines.push(Line::from(Span::styled(
                "Waiting for Spotify in your browser…",
                text,
            )));
            lines.push(Line::from(Span::styled("If nothing opened, visit:", dim)));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                url.clone(),
                Style::default().fg(theme.accent_color),
            )));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled("Press l to start over.", dim)));
        } else {
            lines.push(Line::from(vec![
                Span::styled("Press ", text),
                Span::styled(
                    " l ",
                    Style::default().bg(theme.border_color).fg(theme.text_color),
                ),
                Span::styled(" to log in with Spotify.", text),
            ]));
        }

        let height = (lines.len() as u16 + 2).min(area.height);
        let width = area.width.saturating_sub(4).min(80);
        let panel = Rect::new(
            area.x + (area.width.saturating_sub(width)) / 2,
            area.y + (area.height.saturating_sub(height)) / 2,
            width,
            height,
        );
        let paragraph = Paragraph::new(lines)
            .block(self.block("Login"))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false });
        f.render_widget(paragraph, panel);
    }

    fn render_main(&mut self, f: &mut Frame, area: Rect) {
        let swatch_rows = self
            .sync
            .status()
            .palette
            .palette()
            .map_or(1, |p| p.len().max(1)) as u16;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(swatch_rows + 2),
                Constraint::Length(4),
                Constraint::Min(3),
            ])
            .split(area);

        self.render_now_playing(f, chunks[0]);
        self.render_colors(f, chunks[1]);
        self.render_wled(f, chunks[2]);
        self.render_spectrum_panel(f, chunks[3]);
    }

    fn render_now_playing(&self, f: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let status = self.sync.status();
        let width = area.width.saturating_sub(2) as usize;

        let lines = if let Some(error) = &status.poll_error {
            vec![Line::from(Span::styled(
                truncate_ellipsis(error, width),
                Style::default().fg(theme.error_color),
            ))]
        } else if !status.polled {
            vec![Line::from(Span::styled(
                "Checking Spotify…",
                Style::default().fg(theme.dim_color),
            ))]
        } else {
            let mut lines = vec![Line::from(Span::styled(
                truncate_ellipsis(&status.track_line(), width),
                Style::default()
                    .fg(theme.text_color)
                    .add_modifier(Modifier::BOLD),
            ))];
            if let Some(state) = &status.playback {
                lines.push(Line::from(Span::styled(
                    truncate_ellipsis(&format!("{} · {}", state.artists(), state.album_name), width),
                    Style::default().fg(theme.dim_color),
                )));
            }
            if let Some(url) = status.artwork_url() {
                lines.push(Line::from(Span::styled(
                    truncate_ellipsis(url, width),
                    Style::default().fg(theme.border_color),
                )));
            }
            lines
        };

        f.render_widget(Paragraph::new(lines).block(self.block("Now Playing")), area);
    }

    fn render_colors(&self, f: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let palette_status = &self.sync.status().palette;
        let lines = match palette_status {
            PaletteStatus::Ready(palette) => swatch_lines(palette, theme),
            other => {
                let color = match other {
                    PaletteStatus::Unavailable(_) => theme.error_color,
                    _ => theme.dim_color,
                };
                let message = other.message().unwrap_or_default();
                vec![Line::from(Span::styled(message, Style::default().fg(color)))]
            }
        };
        f.render_widget(Paragraph::new(lines).block(self.block("Colors")), area);
    }

    fn render_wled(&self, f: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let block = self.block("WLED");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let dim = Style::default().fg(theme.dim_color);
        let text = Style::default().fg(theme.text_color);

        let device_line = if let Some(field) = &self.ip_field {
            let value = field.value();
            let prefix = "Device: ";
            f.set_cursor_position(Position::new(
                inner.x + (prefix.len() + field.cursor()) as u16,
                inner.y,
            ));
            Line::from(vec![
                Span::styled(prefix, dim),
                Span::styled(value, Style::default().fg(theme.accent_color)),
                Span::styled("   Enter save · Esc cancel", dim),
            ])
        } else {
            let device = self.sync.device();
            let ip = if device.is_empty() {
                Span::styled("not set (press i)", Style::default().fg(theme.warning_color))
            } else {
                Span::styled(device.ip().to_string(), text)
            };
            Line::from(vec![Span::styled("Device: ", dim), ip])
        };

        let status = self.sync.status();
        let mut result = Vec::new();
        if let Some(message) = &status.wled_message {
            result.push(Span::styled(
                truncate_ellipsis(message, inner.width.saturating_sub(12) as usize),
                text,
            ));
        }
        if let Some(sent) = status.last_sent {
            result.push(Span::styled(format!("  {}", sent.format("%H:%M:%S")), dim));
        }

        f.render_widget(
            Paragraph::new(vec![device_line, Line::from(result)]),
            inner,
        );
    }

    fn render_spectrum_panel(&mut self, f: &mut Frame, area: Rect) {
        let title = if self.sync.is_audio_running() {
            "Spectrum"
        } else {
            "Spectrum (press a)"
        };
        let block = self.block(title);
        let inner = block.inner(area);
        f.render_widget(block, area);

        self.set_spectrum_area(inner);
        render_spectrum(f.buffer_mut(), inner, self.sync.spectrum_canvas());
    }
}
