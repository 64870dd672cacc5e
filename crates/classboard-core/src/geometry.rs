//! Geometric helpers shared by shapes and the board.

use kurbo::{Point, Rect};

/// Slack (logical units) added to a segment's bounding box before the
/// perpendicular-distance test.
pub const SEGMENT_BOUNDS_SLACK: f64 = 2.0;

/// A side of an axis-aligned rectangle, used for alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    /// Coordinate of this edge on `rect`.
    pub fn of(self, rect: Rect) -> f64 {
        match self {
            Edge::Left => rect.x0,
            Edge::Right => rect.x1,
            Edge::Top => rect.y0,
            Edge::Bottom => rect.y1,
        }
    }

    /// The extremal edge coordinate over a set of rectangles: the minimum
    /// for left/top and the maximum for right/bottom.
    pub fn extreme(self, rects: impl IntoIterator<Item = Rect>) -> Option<f64> {
        let values = rects.into_iter().map(|r| self.of(r));
        match self {
            Edge::Left | Edge::Top => values.reduce(f64::min),
            Edge::Right | Edge::Bottom => values.reduce(f64::max),
        }
    }

    /// Translation that moves `rect` so this edge lands on `value`.
    pub fn delta_to(self, rect: Rect, value: f64) -> kurbo::Vec2 {
        let d = value - self.of(rect);
        match self {
            Edge::Left | Edge::Right => kurbo::Vec2::new(d, 0.0),
            Edge::Top | Edge::Bottom => kurbo::Vec2::new(0.0, d),
        }
    }
}

/// Returns `target` if `value` lies strictly within `tolerance` of it.
pub fn snap_value_to(value: f64, target: f64, tolerance: f64) -> Option<f64> {
    ((value - target).abs() < tolerance).then_some(target)
}

/// Snap each axis of `point` independently to `target`.
pub fn snap_point_axes(point: Point, target: Point, tolerance: f64) -> Point {
    Point::new(
        snap_value_to(point.x, target.x, tolerance).unwrap_or(point.x),
        snap_value_to(point.y, target.y, tolerance).unwrap_or(point.y),
    )
}

/// Whether `point` lies within `tolerance` of the segment `a`-`b`.
///
/// The point must first fall inside the segment's bounding box inflated by
/// [`SEGMENT_BOUNDS_SLACK`]; then its perpendicular distance to the
/// segment's line must be below `tolerance`.
pub fn segment_contains(a: Point, b: Point, point: Point, tolerance: f64) -> bool {
    let bounds = Rect::from_points(a, b).inflate(SEGMENT_BOUNDS_SLACK, SEGMENT_BOUNDS_SLACK);
    if !(bounds.x0..=bounds.x1).contains(&point.x) || !(bounds.y0..=bounds.y1).contains(&point.y) {
        return false;
    }
    let v1 = b - a;
    let v2 = point - a;
    let len = v1.hypot();
    if len < f64::EPSILON {
        return v2.hypot() < tolerance;
    }
    v1.cross(v2).abs() / len < tolerance
}

/// Whether `point` lies within `tolerance` of any segment of the polyline.
pub fn polyline_contains(points: &[Point], point: Point, tolerance: f64) -> bool {
    points
        .windows(2)
        .any(|w| segment_contains(w[0], w[1], point, tolerance))
}

/// Axis-aligned bounds of a set of points, or `None` when empty.
pub fn bounds_of_points(points: &[Point]) -> Option<Rect> {
    let (first, rest) = points.split_first()?;
    Some(
        rest.iter()
            .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)),
    )
}

/// Whether two rectangles overlap (touching edges count).
pub fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}
