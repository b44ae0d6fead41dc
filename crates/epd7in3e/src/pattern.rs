//! Built-in test images

use core::str::FromStr;

use crate::color::Color;
use crate::framebuffer::Framebuffer;

/// Band order shared by both patterns
const BANDS: [Color; 6] = [
    Color::Black,
    Color::Yellow,
    Color::Red,
    Color::Blue,
    Color::Green,
    Color::White,
];

/// A fixed image rendered without caller pixel data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Six horizontal bands, top to bottom
    ColorBlocks,
    /// Six vertical bars, left to right
    ColorBars,
}

impl Pattern {
    pub const ALL: [Pattern; 2] = [Pattern::ColorBlocks, Pattern::ColorBars];

    pub fn name(self) -> &'static str {
        match self {
            Pattern::ColorBlocks => "blocks",
            Pattern::ColorBars => "bars",
        }
    }

    /// Color of pixel `(x, y)` on a `width` by `height` panel
    pub fn color_at(self, x: usize, y: usize, width: usize, height: usize) -> Color {
        let band = match self {
            Pattern::ColorBlocks => y * BANDS.len() / height.max(1),
            Pattern::ColorBars => x * BANDS.len() / width.max(1),
        };
        BANDS[band.min(BANDS.len() - 1)]
    }

    pub fn render(self, width: usize, height: usize) -> Framebuffer {
        Framebuffer::from_fn(width, height, |x, y| self.color_at(x, y, width, height))
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocks" | "block" | "7block" => Ok(Pattern::ColorBlocks),
            "bars" | "bar" => Ok(Pattern::ColorBars),
            other => Err(format!("unknown pattern '{other}' (expected blocks or bars)")),
        }
    }
}
