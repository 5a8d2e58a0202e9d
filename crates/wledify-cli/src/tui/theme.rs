//! Colors used across the UI

use ratatui::style::Color;

#[derive(Debug, Clone)]
pub struct Theme {
    pub bg_color: Color,
    pub text_color: Color,
    pub dim_color: Color,
    pub accent_color: Color,
    pub border_color: Color,
    pub success_color: Color,
    pub warning_color: Color,
    pub error_color: Color,
    pub status_bar_bg_color: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            bg_color: Color::Rgb(24, 24, 32),
            text_color: Color::Rgb(220, 220, 230),
            dim_color: Color::Rgb(120, 120, 140),
            // Spotify green
            accent_color: Color::Rgb(30, 215, 96),
            border_color: Color::Rgb(70, 70, 90),
            success_color: Color::Rgb(30, 215, 96),
            warning_color: Color::Rgb(240, 190, 80),
            error_color: Color::Rgb(240, 90, 90),
            status_bar_bg_color: Color::Rgb(34, 34, 46),
        }
    }
}
