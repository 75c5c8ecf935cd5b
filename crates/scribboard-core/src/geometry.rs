//! Point and path math shared by the scribble detector, strokes and rendering.

use kurbo::{Point, Rect};

/// Axis-aligned bounds of a point sequence.
///
/// Returns `Rect::ZERO` for an empty sequence.
pub fn bounding_box<I>(points: I) -> Rect
where
    I: IntoIterator<Item = Point>,
{
    let mut points = points.into_iter();
    let Some(first) = points.next() else {
        return Rect::ZERO;
    };

    let mut min_x = first.x;
    let mut min_y = first.y;
    let mut max_x = first.x;
    let mut max_y = first.y;

    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Rect::new(min_x, min_y, max_x, max_y)
}

/// Absolute difference between the directions of `a -> b` and `b -> c`.
///
/// The result lies in `[0, 2π)`; a full reversal reads as π.
pub fn turn_angle(a: Point, b: Point, c: Point) -> f64 {
    let incoming = (b.y - a.y).atan2(b.x - a.x);
    let outgoing = (c.y - b.y).atan2(c.x - b.x);
    (outgoing - incoming).abs()
}

/// Whether the segment `a -> b` touches `rect` (Liang-Barsky clipping).
pub fn segment_intersects_rect(a: Point, b: Point, rect: Rect) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let edges = [
        (-dx, a.x - rect.x0),
        (dx, rect.x1 - a.x),
        (-dy, a.y - rect.y0),
        (dy, rect.y1 - a.y),
    ];

    for (p, q) in edges {
        if p.abs() < f64::EPSILON {
            // Parallel to this edge: reject if outside it.
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }

    true
}

/// Whether any part of the polyline through `points` touches `rect`.
pub fn polyline_intersects_rect(points: &[Point], rect: Rect) -> bool {
    match points {
        [] => false,
        [only] => rect.contains(*only),
        _ => points
            .windows(2)
            .any(|pair| segment_intersects_rect(pair[0], pair[1], rect)),
    }
}
