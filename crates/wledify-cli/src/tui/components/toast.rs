//! Toast notifications
//!
//! Short-lived messages in the top-right corner for login results,
//! microphone errors and saved settings.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
};
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

use wledify_core::sync::{Alert, AlertLevel};

use crate::tui::theme::Theme;
use crate::tui::utils::truncate_ellipsis;

/// Maximum number of visible toasts
const MAX_VISIBLE_TOASTS: usize = 3;

const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Errors stay up longer so they can be read
const ERROR_DURATION: Duration = Duration::from_secs(8);

const TOAST_WIDTH: u16 = 52;

/// Including borders
const TOAST_HEIGHT: u16 = 3;

const TOAST_GAP: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastType {
    Success,
    Info,
    Error,
}

impl ToastType {
    fn color(&self, theme: &Theme) -> Color {
        match self {
            ToastType::Success => theme.success_color,
            ToastType::Info => theme.accent_color,
            ToastType::Error => theme.error_color,
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            ToastType::Success => "✓",
            ToastType::Info => "•",
            ToastType::Error => "✗",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub toast_type: ToastType,
    pub duration: Duration,
    pub created_at: Instant,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, ToastType::Success, DEFAULT_DURATION)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, ToastType::Info, DEFAULT_DURATION)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, ToastType::Error, ERROR_DURATION)
    }

    fn new(message: impl Into<String>, toast_type: ToastType, duration: Duration) -> Self {
        Self {
            message: message.into(),
            toast_type,
            duration,
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.duration
    }

    /// Remaining fraction (1.0 to 0.0) for the progress bar
    pub fn progress(&self) -> f32 {
        let elapsed = self.created_at.elapsed().as_secs_f32();
        let total = self.duration.as_secs_f32();
        (1.0 - (elapsed / total)).max(0.0)
    }
}

impl From<Alert> for Toast {
    fn from(alert: Alert) -> Self {
        match alert.level {
            AlertLevel::Info => Toast::info(alert.message),
            AlertLevel::Error => Toast::error(alert.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self { toasts: Vec::new() }
    }

    pub fn push(&mut self, toast: Toast) {
        // Same message already showing
        if self.toasts.iter().any(|t| t.message == toast.message) {
            return;
        }

        while self.toasts.len() >= MAX_VISIBLE_TOASTS {
            self.toasts.remove(0);
        }
        self.toasts.push(toast);
    }

    /// Remove expired toasts, returns true if any were removed
    pub fn tick(&mut self) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| !t.is_expired());
        self.toasts.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    /// Most recent first
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().rev().take(MAX_VISIBLE_TOASTS)
    }
}

/// Render toasts in the top-right corner
pub fn render_toasts(buf: &mut Buffer, area: Rect, queue: &ToastQueue, theme: &Theme) {
    if queue.is_empty() || area.width < 8 {
        return;
    }

    let width = TOAST_WIDTH.min(area.width.saturating_sub(2));
    let start_x = area.x + area.width.saturating_sub(width + 2);

    for (i, toast) in queue.visible().enumerate() {
        let y = area.y + 1 + (i as u16 * (TOAST_HEIGHT + TOAST_GAP));
        if y + TOAST_HEIGHT > area.y + area.height {
            break;
        }
        render_toast(buf, Rect::new(start_x, y, width, TOAST_HEIGHT), toast, theme);
    }
}

fn render_toast(buf: &mut Buffer, area: Rect, toast: &Toast, theme: &Theme) {
    let color = toast.toast_type.color(theme);
    let border_style = Style::default().fg(color);
    let right = area.x + area.width - 1;
    let bottom = area.y + area.height - 1;
    let content_y = area.y + 1;

    for x in (area.x + 1)..right {
        if let Some(cell) = buf.cell_mut((x, content_y)) {
            cell.set_char(' ');
            cell.set_bg(theme.bg_color);
        }
    }

    // Top border
    if let Some(cell) = buf.cell_mut((area.x, area.y)) {
        cell.set_char('╭').set_style(border_style);
    }
    for x in (area.x + 1)..right {
        if let Some(cell) = buf.cell_mut((x, area.y)) {
            cell.set_char('─').set_style(border_style);
        }
    }
    if let Some(cell) = buf.cell_mut((right, area.y)) {
        cell.set_char('╮').set_style(border_style);
    }

    // Sides
    for y in (area.y + 1)..bottom {
        if let Some(cell) = buf.cell_mut((area.x, y)) {
            cell.set_char('│').set_style(border_style);
        }
        if let Some(cell) = buf.cell_mut((right, y)) {
            cell.set_char('│').set_style(border_style);
        }
    }

    // Bottom border doubles as the countdown
    if let Some(cell) = buf.cell_mut((area.x, bottom)) {
        cell.set_char('╰').set_style(border_style);
    }
    let progress_width = ((area.width - 2) as f32 * toast.progress()) as u16;
    for (i, x) in ((area.x + 1)..right).enumerate() {
        if let Some(cell) = buf.cell_mut((x, bottom)) {
            if (i as u16) < progress_width {
                cell.set_char('━').set_fg(color);
            } else {
                cell.set_char('─').set_fg(theme.dim_color);
            }
        }
    }
    if let Some(cell) = buf.cell_mut((right, bottom)) {
        cell.set_char('╯').set_style(border_style);
    }

    let mut cx = area.x + 2;
    for ch in toast.toast_type.icon().chars() {
        if let Some(cell) = buf.cell_mut((cx, content_y)) {
            cell.set_char(ch).set_fg(color).set_bg(theme.bg_color);
        }
        cx += UnicodeWidthChar::width(ch).unwrap_or(1) as u16;
    }
    cx += 1;

    let max_msg_width = area.width.saturating_sub(6) as usize;
    for ch in truncate_ellipsis(&toast.message, max_msg_width).chars() {
        if cx >= right - 1 {
            break;
        }
        if let Some(cell) = buf.cell_mut((cx, content_y)) {
            cell.set_char(ch)
                .set_fg(theme.text_color)
                .set_bg(theme.bg_color);
        }
        cx += UnicodeWidthChar::width(ch).unwrap_or(1) as u16;
    }
}
