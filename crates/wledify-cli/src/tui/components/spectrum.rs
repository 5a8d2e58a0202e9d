//! Spectrum bars drawn with eighth-height block characters

use ratatui::{buffer::Buffer, layout::Rect, style::Color};

use wledify_core::spectrum::SpectrumCanvas;

/// Vertical resolution of one terminal row in canvas units
pub const UNITS_PER_ROW: u16 = 8;

const EIGHTHS: [char; 8] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇'];

/// Paint the canvas bars into `area`. The canvas is expected to be sized
/// `area.width` by `area.height * UNITS_PER_ROW`.
pub fn render_spectrum(buf: &mut Buffer, area: Rect, canvas: &SpectrumCanvas) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let bottom = area.y + area.height - 1;
    let max_units = u32::from(area.height) * u32::from(UNITS_PER_ROW);

    for bar in canvas.bars() {
        let first = bar.x.floor() as u16;
        let last = ((bar.x + bar.width).ceil() as u16).max(first + 1);
        let units = (bar.height.round() as u32).min(max_units);
        if units == 0 {
            continue;
        }
        let color = Color::Rgb(bar.color[0], bar.color[1], bar.color[2]);

        for col in first..last.min(area.width) {
            let x = area.x + col;
            let mut remaining = units;
            let mut y = bottom;
            while remaining > 0 {
                let glyph = if remaining >= u32::from(UNITS_PER_ROW) {
                    '█'
                } else {
                    EIGHTHS[remaining as usize]
                };
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_char(glyph).set_fg(color);
                }
                remaining = remaining.saturating_sub(u32::from(UNITS_PER_ROW));
                if y == area.y {
                    break;
                }
                y -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(buf: &Buffer, x: u16, y: u16) -> String {
        buf.cell((x, y)).map(|c| c.symbol().to_string()).unwrap_or_default()
    }

    #[test]
    fn test_full_and_partial_rows() {
        let area = Rect::new(0, 0, 4, 2);
        let mut canvas = SpectrumCanvas::new(area.width, area.height * UNITS_PER_ROW);
        // one bin fills the whole width, magnitude 160 is 10 of 16 units
        canvas.render(&[160]);

        let mut buf = Buffer::empty(area);
        render_spectrum(&mut buf, area, &canvas);

        assert_eq!(symbol(&buf, 0, 1), "█");
        assert_eq!(symbol(&buf, 0, 0), "▂");
        assert_eq!(symbol(&buf, 3, 1), "█");
    }

    #[test]
    fn test_silent_canvas_draws_nothing() {
        let area = Rect::new(0, 0, 4, 2);
        let mut canvas = SpectrumCanvas::new(area.width, area.height * UNITS_PER_ROW);
        canvas.render(&[0, 0]);

        let mut buf = Buffer::empty(area);
        render_spectrum(&mut buf, area, &canvas);
        for x in 0..4 {
            assert_eq!(symbol(&buf, x, 1), " ");
        }
    }
}
