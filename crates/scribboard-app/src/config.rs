//! Host configuration.

use peniko::Color;
use scribboard_core::InkColor;
use scribboard_core::tools::{ERASER_WIDTH, PALETTE, PEN_WIDTH};
use scribboard_render::DEFAULT_BACKGROUND;

/// Whiteboard configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    pub background_color: Color,
    pub pen_width: f64,
    pub eraser_width: f64,
    /// Colors offered by the toolbar, in display order.
    pub palette: Vec<InkColor>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            background_color: DEFAULT_BACKGROUND,
            pen_width: PEN_WIDTH,
            eraser_width: ERASER_WIDTH,
            palette: PALETTE.to_vec(),
        }
    }
}

impl AppConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
