//! Status bar component - bottom bar with session state and shortcuts

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::tui::theme::Theme;

/// What the status bar reports on its left side
pub struct StatusInfo<'a> {
    pub authenticated: bool,
    pub device_ip: &'a str,
    pub audio: bool,
    pub reactive: bool,
    pub busy: bool,
}

/// Render the status bar at the bottom of the screen
pub fn render_status_bar(f: &mut Frame, area: Rect, theme: &Theme, info: &StatusInfo<'_>) {
    let bg = Paragraph::new("").style(Style::default().bg(theme.status_bar_bg_color));
    f.render_widget(bg, area);

    let separator = || Span::styled(" │ ", Style::default().fg(theme.dim_color));

    let (spotify_text, spotify_color) = if info.authenticated {
        ("● spotify", theme.success_color)
    } else {
        ("○ spotify", theme.dim_color)
    };
    let device_text = if info.device_ip.is_empty() {
        "no device".to_string()
    } else {
        info.device_ip.to_string()
    };

    let mut left_spans = vec![
        Span::raw(" "),
        Span::styled(spotify_text, Style::default().fg(spotify_color)),
        separator(),
        Span::styled(device_text.clone(), Style::default().fg(theme.dim_color)),
    ];
    let mut left_width: u16 = 1 + spotify_text.width() as u16 + 3 + device_text.width() as u16;

    if info.audio {
        let (text, color) = if info.reactive {
            ("♪ reactive", theme.accent_color)
        } else {
            ("♪ mic", theme.warning_color)
        };
        left_spans.push(separator());
        left_spans.push(Span::styled(text, Style::default().fg(color)));
        left_width += 3 + text.width() as u16;
    }

    if info.busy {
        left_spans.push(separator());
        left_spans.push(Span::styled("…", Style::default().fg(theme.dim_color)));
        left_width += 4;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(left_width), Constraint::Fill(1)])
        .split(area);

    f.render_widget(Paragraph::new(Line::from(left_spans)), chunks[0]);

    let commands = build_commands_for_width(chunks[1].width as usize, info.authenticated, theme);
    f.render_widget(
        Paragraph::new(Line::from(commands)).alignment(Alignment::Right),
        chunks[1],
    );
}

/// Build command spans based on available width, highest priority first
fn build_commands_for_width<'a>(
    width: usize,
    authenticated: bool,
    theme: &'a Theme,
) -> Vec<Span<'a>> {
    let commands: &[(&str, &str)] = if authenticated {
        &[
            (" q ", "quit "),
            (" s ", "send "),
            (" i ", "ip "),
            (" a ", "mic "),
            (" v ", "reactive "),
            (" r ", "refresh "),
            (" o ", "logout "),
        ]
    } else {
        &[(" q ", "quit "), (" l ", "login ")]
    };

    let mut spans = Vec::new();
    let mut used_width = 0;
    for (key, desc) in commands {
        let cmd_width = key.width() + desc.width();
        if used_width + cmd_width > width {
            break;
        }
        spans.push(Span::styled(
            *key,
            Style::default().bg(theme.border_color).fg(theme.text_color),
        ));
        spans.push(Span::styled(*desc, Style::default().fg(theme.dim_color)));
        used_width += cmd_width;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_drop_from_the_end_when_narrow() {
        let theme = Theme::default();
        let all = build_commands_for_width(200, true, &theme);
        assert_eq!(all.len(), 14);

        // " q quit " + " s send " fit in 16 columns
        let narrow = build_commands_for_width(16, true, &theme);
        assert_eq!(narrow.len(), 4);
        assert_eq!(narrow[0].content, " q ");
        assert_eq!(narrow[2].content, " s ");
    }

    #[test]
    fn test_logged_out_shows_login() {
        let theme = Theme::default();
        let spans = build_commands_for_width(200, false, &theme);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[2].content, " l ");
    }
}
