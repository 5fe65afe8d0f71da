//! Planar geometry consumed by the arena: points, axis-aligned ranges and the
//! two shape primitives agents can occupy.
//!
//! A [`Shape`] is either an oriented rectangle or a circle. The arena only
//! needs a handful of operations from it: the center, the axis-aligned
//! bounding [`Range`], translation, rotation about the center, pairwise
//! intersection, point containment and the maximum radius.
//!
//! Intersection is strict: shapes that merely touch along an edge do not
//! intersect. Range overlap and containment are closed (boundaries count).
//!
//! # Example
//!
//! ```
//! use arena_core::geometry::{Point, Shape};
//!
//! let wall = Shape::rect(Point::new(5.0, 5.0), 1.0, 1.0);
//! let mover = Shape::rect(Point::new(5.0, 3.0), 0.1, 0.1);
//!
//! assert!(!wall.intersects(&mover));
//! assert!(wall.intersects(&mover.translated_to(Point::new(5.0, 5.0))));
//! assert!(!wall.intersects(&mover.translated_to(Point::new(5.0, 4.4))));
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A location in arena coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point::new(0.0, 0.0);

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// This point shifted by `(dx, dy)`.
    #[inline]
    pub fn offset(self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle described by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Point,
    pub max: Point,
}

impl Range {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// The square of side `2 * radius` centered on `center`.
    pub fn around(center: Point, radius: f64) -> Self {
        Self {
            min: center.offset(-radius, -radius),
            max: center.offset(radius, radius),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Closed containment of a point.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether `other` lies entirely within this range (boundaries included).
    pub fn contains_range(&self, other: &Range) -> bool {
        other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
    }

    /// Closed overlap test: ranges sharing only an edge still overlap.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// The footprint of an agent.
///
/// The position of an agent is always the center of its shape; there is no
/// separately stored position anywhere in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// A rectangle rotated by `angle` radians about its center.
    Rect {
        center: Point,
        half_width: f64,
        half_height: f64,
        angle: f64,
    },
    /// A disc. A radius of zero models a dimensionless marker.
    Circle { center: Point, radius: f64 },
}

impl Shape {
    /// An unrotated rectangle of the given full width and height.
    pub fn rect(center: Point, width: f64, height: f64) -> Self {
        Shape::Rect {
            center,
            half_width: width / 2.0,
            half_height: height / 2.0,
            angle: 0.0,
        }
    }

    pub fn circle(center: Point, radius: f64) -> Self {
        Shape::Circle { center, radius }
    }

    /// A zero-extent marker, used for background objects.
    pub fn marker(center: Point) -> Self {
        Shape::Circle {
            center,
            radius: 0.0,
        }
    }

    pub fn center(&self) -> Point {
        match *self {
            Shape::Rect { center, .. } | Shape::Circle { center, .. } => center,
        }
    }

    /// Rotation angle in radians. Always zero for circles.
    pub fn angle(&self) -> f64 {
        match *self {
            Shape::Rect { angle, .. } => angle,
            Shape::Circle { .. } => 0.0,
        }
    }

    /// Axis-aligned bounding range.
    pub fn range(&self) -> Range {
        match *self {
            Shape::Rect {
                center,
                half_width,
                half_height,
                angle,
            } => {
                let (sin, cos) = angle.sin_cos();
                let ex = half_width * cos.abs() + half_height * sin.abs();
                let ey = half_width * sin.abs() + half_height * cos.abs();
                Range::new(center.offset(-ex, -ey), center.offset(ex, ey))
            }
            Shape::Circle { center, radius } => Range::around(center, radius),
        }
    }

    /// Distance from the center to the farthest point of the shape.
    pub fn max_radius(&self) -> f64 {
        match *self {
            Shape::Rect {
                half_width,
                half_height,
                ..
            } => half_width.hypot(half_height),
            Shape::Circle { radius, .. } => radius,
        }
    }

    /// The same shape with its center moved to `target`.
    pub fn translated_to(&self, target: Point) -> Shape {
        let mut out = *self;
        match &mut out {
            Shape::Rect { center, .. } | Shape::Circle { center, .. } => *center = target,
        }
        out
    }

    /// The same shape rotated by `delta` radians about its own center.
    pub fn rotated(&self, delta: f64) -> Shape {
        let mut out = *self;
        if let Shape::Rect { angle, .. } = &mut out {
            *angle += delta;
        }
        out
    }

    /// Closed point containment.
    pub fn contains_point(&self, p: Point) -> bool {
        match *self {
            Shape::Rect {
                center,
                half_width,
                half_height,
                angle,
            } => {
                let (lx, ly) = to_local(center, angle, p);
                lx.abs() <= half_width && ly.abs() <= half_height
            }
            Shape::Circle { center, radius } => center.distance(p) <= radius,
        }
    }

    /// Strict intersection: the interiors overlap.
    pub fn intersects(&self, other: &Shape) -> bool {
        match (*self, *other) {
            (
                Shape::Circle {
                    center: a,
                    radius: ra,
                },
                Shape::Circle {
                    center: b,
                    radius: rb,
                },
            ) => a.distance(b) < ra + rb,
            (Shape::Circle { center, radius }, rect @ Shape::Rect { .. })
            | (rect @ Shape::Rect { .. }, Shape::Circle { center, radius }) => {
                circle_rect(center, radius, &rect)
            }
            (a @ Shape::Rect { .. }, b @ Shape::Rect { .. }) => rect_rect(&a, &b),
        }
    }
}

// ---------------------------------------------------------------------------
// Intersection helpers
// ---------------------------------------------------------------------------

/// Coordinates of `p` in the frame of a rectangle centered at `center` and
/// rotated by `angle`.
fn to_local(center: Point, angle: f64, p: Point) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    (dx * cos + dy * sin, -dx * sin + dy * cos)
}

fn circle_rect(c: Point, radius: f64, rect: &Shape) -> bool {
    let Shape::Rect {
        center,
        half_width,
        half_height,
        angle,
    } = *rect
    else {
        return false;
    };
    let (lx, ly) = to_local(center, angle, c);
    if lx.abs() < half_width && ly.abs() < half_height {
        return true;
    }
    let nx = lx.clamp(-half_width, half_width);
    let ny = ly.clamp(-half_height, half_height);
    let (dx, dy) = (lx - nx, ly - ny);
    dx * dx + dy * dy < radius * radius
}

/// Separating-axis test over the four edge normals.
fn rect_rect(a: &Shape, b: &Shape) -> bool {
    let (
        Shape::Rect {
            center: ca,
            half_width: wa,
            half_height: ha,
            angle: aa,
        },
        Shape::Rect {
            center: cb,
            half_width: wb,
            half_height: hb,
            angle: ab,
        },
    ) = (*a, *b)
    else {
        return false;
    };

    let (sa, coa) = aa.sin_cos();
    let (sb, cob) = ab.sin_cos();
    let axes_a = [(coa, sa), (-sa, coa)];
    let axes_b = [(cob, sb), (-sb, cob)];
    let d = (cb.x - ca.x, cb.y - ca.y);

    let dot = |u: (f64, f64), v: (f64, f64)| u.0 * v.0 + u.1 * v.1;

    for axis in axes_a.iter().chain(axes_b.iter()) {
        let ra = wa * dot(axes_a[0], *axis).abs() + ha * dot(axes_a[1], *axis).abs();
        let rb = wb * dot(axes_b[0], *axis).abs() + hb * dot(axes_b[1], *axis).abs();
        if dot(d, *axis).abs() >= ra + rb {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn rect_range_unrotated() {
        let r = Shape::rect(Point::new(5.0, 5.0), 1.0, 2.0).range();
        assert_eq!(r.min, Point::new(4.5, 4.0));
        assert_eq!(r.max, Point::new(5.5, 6.0));
    }

    #[test]
    fn rotated_square_range_grows() {
        let s = Shape::rect(Point::new(0.0, 0.0), 2.0, 2.0).rotated(FRAC_PI_4);
        let r = s.range();
        let expected = 2.0_f64.sqrt();
        assert!((r.max.x - expected).abs() < 1e-12);
        assert!((r.min.y + expected).abs() < 1e-12);
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Shape::rect(Point::new(0.0, 0.0), 1.0, 1.0);
        let b = Shape::rect(Point::new(1.0, 0.0), 1.0, 1.0);
        assert!(!a.intersects(&b));
        assert!(a.range().overlaps(&b.range()));
    }

    #[test]
    fn rotated_rect_sat_separation() {
        // A diamond whose bounding box overlaps the square's corner, but
        // whose body does not.
        let square = Shape::rect(Point::new(0.0, 0.0), 2.0, 2.0);
        let diamond = Shape::rect(Point::new(2.3, 2.3), 2.0, 2.0).rotated(FRAC_PI_4);
        assert!(square.range().overlaps(&diamond.range()));
        assert!(!square.intersects(&diamond));
        assert!(!diamond.intersects(&square));
    }

    #[test]
    fn circle_rect_intersection() {
        let rect = Shape::rect(Point::new(0.0, 0.0), 2.0, 2.0);
        assert!(Shape::circle(Point::new(1.4, 0.0), 0.5).intersects(&rect));
        assert!(!Shape::circle(Point::new(1.6, 0.0), 0.5).intersects(&rect));
        // Corner case: diagonal distance exceeds the radius.
        assert!(!Shape::circle(Point::new(1.4, 1.4), 0.5).intersects(&rect));
    }

    #[test]
    fn marker_inside_rect_intersects() {
        let rect = Shape::rect(Point::new(0.0, 0.0), 2.0, 2.0);
        assert!(Shape::marker(Point::new(0.5, 0.5)).intersects(&rect));
        assert!(!Shape::marker(Point::new(3.0, 0.5)).intersects(&rect));
    }

    #[test]
    fn contains_point_respects_rotation() {
        let s = Shape::rect(Point::new(0.0, 0.0), 4.0, 0.2).rotated(FRAC_PI_4);
        assert!(s.contains_point(Point::new(1.0, 1.0)));
        assert!(!s.contains_point(Point::new(1.0, -1.0)));
    }

    #[test]
    fn translate_keeps_extent_and_angle() {
        let s = Shape::rect(Point::new(1.0, 1.0), 1.0, 3.0).rotated(0.3);
        let t = s.translated_to(Point::new(7.0, 2.0));
        assert_eq!(t.center(), Point::new(7.0, 2.0));
        assert_eq!(t.angle(), 0.3);
        assert_eq!(t.max_radius(), s.max_radius());
    }

    #[test]
    fn range_containment_is_closed() {
        let arena = Range::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let edge = Shape::rect(Point::new(0.5, 9.5), 1.0, 1.0).range();
        assert!(arena.contains_range(&edge));
        let outside = Shape::rect(Point::new(0.4, 5.0), 1.0, 1.0).range();
        assert!(!arena.contains_range(&outside));
    }
}
