//! Tool and session state: current ink color, eraser flag and view.

use crate::camera::ViewTransform;
use crate::stroke::InkColor;
use serde::{Deserialize, Serialize};

/// Colors offered by the toolbar.
pub const PALETTE: [InkColor; 6] = [
    InkColor::new(0x00, 0x00, 0x00),
    InkColor::new(0xff, 0x00, 0x00),
    InkColor::new(0x00, 0xcc, 0x00),
    InkColor::new(0x00, 0x00, 0xff),
    InkColor::new(0xff, 0xff, 0x00),
    InkColor::new(0xff, 0x00, 0xff),
];

/// Default pen width in canvas units.
pub const PEN_WIDTH: f64 = 3.0;
/// Default eraser width in canvas units.
pub const ERASER_WIDTH: f64 = 30.0;

/// Style captured at pointer-down and applied to the whole gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkStyle {
    pub color: InkColor,
    pub width: f64,
    pub is_eraser: bool,
}

/// Current tool selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    color: InkColor,
    eraser: bool,
    pen_width: f64,
    eraser_width: f64,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            color: PALETTE[0],
            eraser: false,
            pen_width: PEN_WIDTH,
            eraser_width: ERASER_WIDTH,
        }
    }
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom widths for the pen and eraser (non-positive values are ignored).
    pub fn with_widths(mut self, pen_width: f64, eraser_width: f64) -> Self {
        if pen_width > 0.0 {
            self.pen_width = pen_width;
        }
        if eraser_width > 0.0 {
            self.eraser_width = eraser_width;
        }
        self
    }

    pub fn color(&self) -> InkColor {
        self.color
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    /// Pick an ink color. Picking a color switches back to the pen.
    pub fn set_color(&mut self, color: InkColor) {
        self.color = color;
        self.eraser = false;
    }

    /// Flip between pen and eraser; returns the new eraser flag.
    pub fn toggle_eraser(&mut self) -> bool {
        self.eraser = !self.eraser;
        self.eraser
    }

    /// Style for a gesture started now.
    pub fn ink_style(&self) -> InkStyle {
        InkStyle {
            color: self.color,
            width: if self.eraser { self.eraser_width } else { self.pen_width },
            is_eraser: self.eraser,
        }
    }
}

/// Mutable per-surface session: tools plus view.
///
/// Owned by the input controller; renderers read it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Session {
    pub tools: ToolState,
    pub view: ViewTransform,
}
