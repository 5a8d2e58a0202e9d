//! Palette swatch rows

use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

use wledify_core::Palette;

use crate::tui::theme::Theme;

/// One line per swatch: a color block, its hex code and its share of the image.
/// The first swatch is the one `send` dispatches.
pub fn swatch_lines<'a>(palette: &Palette, theme: &Theme) -> Vec<Line<'a>> {
    palette
        .swatches()
        .iter()
        .enumerate()
        .map(|(i, swatch)| {
            let block = Span::styled(
                "████ ",
                Style::default().fg(Color::Rgb(swatch.red, swatch.green, swatch.blue)),
            );
            let hex = Span::styled(swatch.hex.clone(), Style::default().fg(theme.text_color));
            let share = Span::styled(
                format!("  {:>3.0}%", swatch.area * 100.0),
                Style::default().fg(theme.dim_color),
            );
            let mut spans = vec![block, hex, share];
            if i == 0 {
                spans.push(Span::styled(
                    "  dominant",
                    Style::default().fg(theme.accent_color),
                ));
            }
            Line::from(spans)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wledify_core::Swatch;

    #[test]
    fn test_one_line_per_swatch_with_dominant_marked() {
        let palette = Palette::new(vec![
            Swatch::new(255, 0, 0, 0.6),
            Swatch::new(0, 255, 0, 0.4),
        ]);
        let lines = swatch_lines(&palette, &Theme::default());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].spans[1].content, "#ff0000");
        assert_eq!(lines[0].spans[2].content, "   60%");
        assert_eq!(lines[0].spans.len(), 4);
        assert_eq!(lines[1].spans.len(), 3);
    }
}
