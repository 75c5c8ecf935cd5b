//! Scribble-to-erase gesture detection.
//!
//! A scribble is a tight, rapidly reversing motion. The detector looks only at
//! the most recent points of the active gesture, so each check is bounded.

use crate::geometry::{bounding_box, turn_angle};
use kurbo::{Point, Rect};
use std::collections::VecDeque;

/// Number of recent points the motion window keeps.
pub const MOTION_WINDOW: usize = 30;
/// Fewer points than this never trigger.
pub const MIN_POINTS: usize = 10;
/// Bounding-box area (canvas units squared) below which motion counts as tight.
pub const MAX_AREA: f64 = 10_000.0;
/// Turn angle (radians) above which a triple counts as a reversal.
pub const TURN_THRESHOLD: f64 = 0.7;
/// Reversal count that must be exceeded to trigger.
pub const MIN_TURNS: usize = 8;
/// Padding added on every side of the erase region.
pub const ERASE_PADDING: f64 = 20.0;

/// Bounded ring of the most recent gesture points; oldest drop first.
#[derive(Debug, Clone)]
pub struct MotionBuffer {
    points: VecDeque<Point>,
    capacity: usize,
}

impl Default for MotionBuffer {
    fn default() -> Self {
        Self::with_capacity(MOTION_WINDOW)
    }
}

impl MotionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest when full.
    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points oldest-first.
    pub fn points(&self) -> impl ExactSizeIterator<Item = Point> + '_ {
        self.points.iter().copied()
    }
}

/// Heuristic erase-scribble detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScribbleDetector;

impl ScribbleDetector {
    pub fn new() -> Self {
        Self
    }

    /// Count consecutive-triple turns sharper than [`TURN_THRESHOLD`].
    pub fn count_turns(points: &[Point]) -> usize {
        points
            .windows(3)
            .filter(|w| turn_angle(w[0], w[1], w[2]) > TURN_THRESHOLD)
            .count()
    }

    /// Decide whether `window` is an erase scribble.
    ///
    /// Returns the padded region to clear on trigger.
    pub fn detect(&self, window: &MotionBuffer) -> Option<Rect> {
        let points: Vec<Point> = window.points().collect();
        self.detect_points(&points)
    }

    /// Same as [`detect`](Self::detect) on a plain slice.
    pub fn detect_points(&self, points: &[Point]) -> Option<Rect> {
        if points.len() < MIN_POINTS {
            return None;
        }

        let bounds = bounding_box(points.iter().copied());
        if bounds.area() >= MAX_AREA {
            return None;
        }

        let turns = Self::count_turns(points);
        if turns <= MIN_TURNS {
            return None;
        }

        log::debug!(
            "Scribble detected: {} turns in {:.0}x{:.0}",
            turns,
            bounds.width(),
            bounds.height()
        );
        Some(bounds.inflate(ERASE_PADDING, ERASE_PADDING))
    }
}
