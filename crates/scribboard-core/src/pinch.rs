//! Two-finger pinch zoom.

use crate::camera::ViewTransform;
use kurbo::Point;

/// Scale change per pixel of pinch distance change.
pub const PINCH_SENSITIVITY: f64 = 0.005;

/// Tracks the distance between two touch contacts across moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinchZoom {
    last_distance: Option<f64>,
}

impl PinchZoom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pinch is in progress (a previous distance is known).
    pub fn is_active(&self) -> bool {
        self.last_distance.is_some()
    }

    /// Handle a multi-touch move with the current contact positions.
    ///
    /// Only the first two contacts are used. Returns true if the scale changed.
    pub fn touch_move(&mut self, contacts: &[Point], view: &mut ViewTransform) -> bool {
        let [a, b, ..] = contacts else {
            self.reset();
            return false;
        };

        let distance = a.distance(*b);
        let changed = match self.last_distance {
            Some(previous) => view.set_scale(view.scale() + (distance - previous) * PINCH_SENSITIVITY),
            None => false,
        };
        self.last_distance = Some(distance);

        if changed {
            log::debug!("Pinch zoom to {:.3}", view.scale());
        }
        changed
    }

    /// A contact lifted or the touch was cancelled.
    pub fn touch_end(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.last_distance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{MAX_SCALE, MIN_SCALE};

    fn pair(distance: f64) -> [Point; 2] {
        [Point::new(0.0, 0.0), Point::new(distance, 0.0)]
    }

    #[test]
    fn test_first_move_only_records_distance() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        assert!(!pinch.touch_move(&pair(100.0), &mut view));
        assert!(pinch.is_active());
        assert!((view.scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_spread_zooms_in() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&pair(100.0), &mut view);
        assert!(pinch.touch_move(&pair(200.0), &mut view));
        assert!((view.scale() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_spread_clamps_to_max() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&pair(10.0), &mut view);
        pinch.touch_move(&pair(10_010.0), &mut view);
        assert!((view.scale() - MAX_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extreme_squeeze_clamps_to_min() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&pair(10_000.0), &mut view);
        pinch.touch_move(&pair(0.0), &mut view);
        assert!((view.scale() - MIN_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_contact_resets() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&pair(100.0), &mut view);
        assert!(!pinch.touch_move(&[Point::new(0.0, 0.0)], &mut view));
        assert!(!pinch.is_active());

        // The next two-finger move starts fresh rather than jumping.
        assert!(!pinch.touch_move(&pair(400.0), &mut view));
        assert!((view.scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_touch_end_resets() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&pair(100.0), &mut view);
        pinch.touch_end();
        assert!(!pinch.is_active());
    }

    #[test]
    fn test_pinch_never_pans() {
        let mut pinch = PinchZoom::new();
        let mut view = ViewTransform::new();
        pinch.touch_move(&[Point::new(50.0, 50.0), Point::new(60.0, 50.0)], &mut view);
        pinch.touch_move(&[Point::new(10.0, 10.0), Point::new(90.0, 90.0)], &mut view);
        assert_eq!(view.offset, kurbo::Vec2::ZERO);
    }
}
