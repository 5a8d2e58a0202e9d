//! Bar-chart model of a spectrum frame
//!
//! Geometry is in abstract canvas units; the terminal UI maps one unit to one
//! cell. Bars run left to right from bin 0 and are clipped at the right edge.

/// One rendered bar
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub bin: usize,
    pub x: f32,
    pub width: f32,
    /// Measured up from the bottom edge
    pub height: f32,
    pub color: [u8; 3],
}

/// Per-bin color from bin position and magnitude
pub fn bar_color(index: usize, count: usize, magnitude: u8) -> [u8; 3] {
    let position = if count == 0 {
        0.0
    } else {
        index as f32 / count as f32
    };
    let r = (f32::from(magnitude) + 25.0 * position).min(255.0);
    let g = (250.0 * position).min(255.0);
    [r.round() as u8, g.round() as u8, 50]
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumCanvas {
    width: f32,
    height: f32,
    bars: Vec<Bar>,
}

impl SpectrumCanvas {
    /// Gap between adjacent bars
    pub const GAP: f32 = 1.0;

    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width: f32::from(width),
            height: f32::from(height),
            bars: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Change dimensions. Takes effect on the next render.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = f32::from(width);
        self.height = f32::from(height);
    }

    /// Replace the bars with a rendering of `magnitudes`
    pub fn render(&mut self, magnitudes: &[u8]) {
        self.bars.clear();
        let count = magnitudes.len();
        if count == 0 || self.width <= 0.0 || self.height <= 0.0 {
            return;
        }

        let bar_width = (self.width / count as f32) * 2.5;
        let mut x = 0.0;
        for (i, &magnitude) in magnitudes.iter().enumerate() {
            if x >= self.width {
                break;
            }
            // m/2 on a 128-unit tall canvas, scaled to our height
            let height = f32::from(magnitude) / 255.0 * self.height;
            self.bars.push(Bar {
                bin: i,
                x,
                width: bar_width.min(self.width - x),
                height,
                color: bar_color(i, count, magnitude),
            });
            x += bar_width + Self::GAP;
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    pub fn is_blank(&self) -> bool {
        self.bars.is_empty()
    }
}
