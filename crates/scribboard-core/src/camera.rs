//! View transform for pan/zoom between screen and canvas space.

use kurbo::{Affine, Point, Vec2};
use serde::Serialize;

/// Smallest allowed zoom scale.
pub const MIN_SCALE: f64 = 0.5;
/// Largest allowed zoom scale.
pub const MAX_SCALE: f64 = 3.0;

/// Maps canvas coordinates to screen coordinates.
///
/// `screen = canvas * scale + offset`. Strokes are stored in canvas space,
/// pointer events arrive in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewTransform {
    /// Zoom level, always within `[MIN_SCALE, MAX_SCALE]`.
    scale: f64,
    /// Current translation offset (pan)
    pub offset: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
        }
    }
}

impl ViewTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Set the zoom level, clamped to the allowed range.
    ///
    /// Returns true if the scale changed. Non-finite input is ignored.
    pub fn set_scale(&mut self, scale: f64) -> bool {
        if !scale.is_finite() {
            return false;
        }
        let clamped = scale.clamp(MIN_SCALE, MAX_SCALE);
        if (clamped - self.scale).abs() < f64::EPSILON {
            return false;
        }
        self.scale = clamped;
        true
    }

    /// Get the affine transform for rendering (canvas -> screen).
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Get the inverse transform for input handling (screen -> canvas).
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    pub fn screen_to_canvas(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    pub fn canvas_to_screen(&self, canvas_point: Point) -> Point {
        self.transform() * canvas_point
    }

    /// Pan the view by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Reset to identity.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
